//! Shared fixtures for registration tests

#![allow(dead_code)]

use std::sync::Arc;

use shardlead_config::ShardLeaderConfig;
use shardlead_election::{
    CoordinationClient, CreateMode, ElectionContext, ElectionPaths, InMemoryClient,
    InMemoryCoordinator, LeaderProps, ShardLeaderElectionContext,
};

pub const COLLECTION: &str = "collection1";
pub const SHARD: &str = "shard1";

/// One shard's node layout on a fresh in-memory coordination service
pub struct TestShard {
    pub coordinator: InMemoryCoordinator,
    pub paths: ElectionPaths,
    admin: InMemoryClient,
}

/// A candidate: its own session plus its registration context
pub struct Candidate {
    pub client: Arc<InMemoryClient>,
    pub leader: ShardLeaderElectionContext,
}

impl Candidate {
    pub fn seq_path(&self) -> &str {
        self.leader.context().leader_seq_path()
    }
}

impl TestShard {
    pub fn new() -> Self {
        let coordinator = InMemoryCoordinator::new();
        let admin = coordinator.connect();
        let paths = ElectionPaths::for_shard("/collections", COLLECTION, SHARD);
        admin.make_path(&paths.election_path).unwrap();
        admin.make_path(paths.leader_parent().unwrap()).unwrap();
        Self {
            coordinator,
            paths,
            admin,
        }
    }

    pub fn config(&self, core_node_name: &str) -> ShardLeaderConfig {
        ShardLeaderConfig {
            collection: COLLECTION.to_string(),
            shard: SHARD.to_string(),
            core_node_name: core_node_name.to_string(),
            node_name: format!("127.0.0.1:8983_{core_node_name}"),
            base_url: "http://127.0.0.1:8983/solr".to_string(),
            core: format!("{COLLECTION}_{SHARD}_{core_node_name}"),
            ..Default::default()
        }
    }

    /// Join the election queue under a new session and build the context
    pub fn candidate(&self, core_node_name: &str) -> Candidate {
        let client = Arc::new(self.coordinator.connect());
        let seq_path = client
            .create(
                &format!("{}/{}-n_", self.paths.election_path, core_node_name),
                Vec::new(),
                CreateMode::EphemeralSequential,
            )
            .unwrap();
        let context = ElectionContext::from_config(&self.config(core_node_name), seq_path).unwrap();
        let leader = ShardLeaderElectionContext::new(context, client.clone());
        Candidate { client, leader }
    }

    pub fn leader_parent_version(&self) -> i32 {
        self.coordinator
            .node_stat(self.paths.leader_parent().unwrap())
            .unwrap()
            .version
    }

    /// `core_node_name` published in the current leader marker
    pub fn current_leader(&self) -> Option<String> {
        self.coordinator
            .node_data(&self.paths.leader_path)
            .map(|bytes| LeaderProps::from_bytes(&bytes).unwrap().core_node_name)
    }

    pub fn admin(&self) -> &InMemoryClient {
        &self.admin
    }
}
