//! One shard with several replicas sharing an in-memory coordination service

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shardlead_config::ShardLeaderConfig;
use shardlead_election::paths::node_name;
use shardlead_election::{
    CoordinationClient, CreateMode, ElectionContext, ElectionPaths, InMemoryClient,
    InMemoryCoordinator, LeaderProps, Registration, ShardLeaderElectionContext,
};
use tracing::{debug, info, warn};

use crate::error::{Result, SimulationError};
use crate::terms::{max_term, ShardTerms};

pub const COLLECTION: &str = "collection1";
pub const SHARD: &str = "shard1";

const ROOT: &str = "/collections";
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A running replica's session and its place in the election queue
struct Session {
    client: Arc<InMemoryClient>,
    election: ShardLeaderElectionContext,
}

impl Session {
    fn seq_node(&self) -> &str {
        node_name(self.election.context().leader_seq_path())
    }
}

struct Replica {
    config: ShardLeaderConfig,
    docs: BTreeSet<u64>,
    running: bool,
    partitioned: bool,
    session: Option<Session>,
}

impl Replica {
    fn node(&self) -> &str {
        &self.config.node_name
    }

    fn core_node_name(&self) -> &str {
        &self.config.core_node_name
    }
}

/// A single-shard collection whose replicas live on nodes `node0..`
///
/// Nothing happens on its own: every election step and follower recovery
/// runs inside [`tick`](Self::tick), so tests decide when the cluster moves.
pub struct SimulatedShard {
    coordinator: InMemoryCoordinator,
    admin: InMemoryClient,
    paths: ElectionPaths,
    terms: ShardTerms,
    replicas: Vec<Replica>,
}

impl SimulatedShard {
    /// Create the shard and start every replica, in node order
    pub fn new(replicas: usize) -> Result<Self> {
        let coordinator = InMemoryCoordinator::new();
        let admin = coordinator.connect();
        let paths = ElectionPaths::for_shard(ROOT, COLLECTION, SHARD);
        admin.make_path(&paths.election_path)?;
        admin.make_path(paths.leader_parent()?)?;
        let terms = ShardTerms::for_shard(ROOT, COLLECTION, SHARD);
        terms.ensure(&admin)?;

        let mut shard = Self {
            coordinator,
            admin,
            paths,
            terms,
            replicas: (0..replicas).map(replica_config).map(Replica::new).collect(),
        };
        for i in 0..replicas {
            shard.start(&format!("node{i}"))?;
        }
        Ok(shard)
    }

    pub fn coordinator(&self) -> &InMemoryCoordinator {
        &self.coordinator
    }

    pub fn nodes(&self) -> Vec<String> {
        self.replicas.iter().map(|r| r.node().to_string()).collect()
    }

    pub fn is_running(&self, node: &str) -> Result<bool> {
        Ok(self.replicas[self.index(node)?].running)
    }

    /// Bring a replica up: fresh session, term entry, and a queue entry at the back
    pub fn start(&mut self, node: &str) -> Result<()> {
        let idx = self.index(node)?;
        if self.replicas[idx].running {
            return Ok(());
        }
        self.terms
            .register(&self.admin, self.replicas[idx].core_node_name())?;
        let client = Arc::new(self.coordinator.connect());
        let session = self.join_queue(idx, client)?;
        info!("Started {} queued as {}", node, session.seq_node());

        let replica = &mut self.replicas[idx];
        replica.session = Some(session);
        replica.running = true;
        Ok(())
    }

    /// Shut a replica down; a leader releases its marker on the way out
    pub fn stop(&mut self, node: &str) -> Result<()> {
        let idx = self.index(node)?;
        let replica = &mut self.replicas[idx];
        replica.running = false;
        if let Some(session) = replica.session.take() {
            session.election.close();
            session.client.close();
            info!("Stopped {}", node);
        }
        Ok(())
    }

    /// Cut a replica off from its peers; its coordination session stays up
    pub fn partition(&mut self, node: &str) -> Result<()> {
        let idx = self.index(node)?;
        self.replicas[idx].partitioned = true;
        info!("Partitioned {}", node);
        Ok(())
    }

    pub fn heal(&mut self, node: &str) -> Result<()> {
        let idx = self.index(node)?;
        self.replicas[idx].partitioned = false;
        info!("Healed {}", node);
        Ok(())
    }

    /// Index documents through the leader
    ///
    /// Followers the leader cannot reach miss the write, and the leader moves
    /// itself and the reached followers to a higher term.
    pub fn add_docs(&mut self, ids: impl IntoIterator<Item = u64>) -> Result<()> {
        let leader = self.leader_index()?.ok_or(SimulationError::NoLeader)?;
        let ids: Vec<u64> = ids.into_iter().collect();

        let mut reached = Vec::new();
        let mut missed = Vec::new();
        for (idx, replica) in self.replicas.iter().enumerate() {
            if idx == leader {
                continue;
            }
            if self.can_reach(leader, idx) {
                reached.push(idx);
            } else {
                missed.push(replica.node().to_string());
            }
        }

        for &idx in std::iter::once(&leader).chain(reached.iter()) {
            self.replicas[idx].docs.extend(ids.iter().copied());
        }
        debug!(
            "Indexed {:?} on {} and {} followers",
            ids,
            self.replicas[leader].node(),
            reached.len()
        );

        if !missed.is_empty() {
            let reached_names: Vec<String> = reached
                .iter()
                .map(|&idx| self.replicas[idx].core_node_name().to_string())
                .collect();
            let term = self.terms.ensure_highest(
                &self.admin,
                self.replicas[leader].core_node_name(),
                &reached_names,
            )?;
            warn!(
                "Write {:?} missed {:?}, leader {} moved to term {}",
                ids,
                missed,
                self.replicas[leader].node(),
                term
            );
        }
        Ok(())
    }

    /// Run one election step, then let reachable followers recover from the leader
    pub fn tick(&mut self) -> Result<()> {
        self.run_election()?;
        self.recover_followers()
    }

    /// Tick until the leader satisfies `pred`, or fail with `Timeout`
    pub fn wait_for_leader<F>(&mut self, timeout: Duration, pred: F) -> Result<String>
    where
        F: Fn(&str) -> bool,
    {
        let started = Instant::now();
        loop {
            self.tick()?;
            if let Some(leader) = self.leader()? {
                if pred(&leader) {
                    return Ok(leader);
                }
            }
            if started.elapsed() >= timeout {
                return Err(SimulationError::Timeout { timeout });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Node named in the current leader marker
    pub fn leader(&self) -> Result<Option<String>> {
        match self.coordinator.node_data(&self.paths.leader_path) {
            Some(bytes) => Ok(Some(LeaderProps::from_bytes(&bytes)?.node_name)),
            None => Ok(None),
        }
    }

    /// Documents held by a replica, in id order
    pub fn docs(&self, node: &str) -> Result<Vec<u64>> {
        let idx = self.index(node)?;
        Ok(self.replicas[idx].docs.iter().copied().collect())
    }

    /// Current term of a replica
    pub fn term(&self, node: &str) -> Result<u64> {
        let idx = self.index(node)?;
        let terms = self.terms.read(&self.admin)?;
        Ok(terms
            .get(self.replicas[idx].core_node_name())
            .copied()
            .unwrap_or(0))
    }

    fn index(&self, node: &str) -> Result<usize> {
        self.replicas
            .iter()
            .position(|r| r.node() == node)
            .ok_or_else(|| SimulationError::UnknownNode(node.to_string()))
    }

    fn leader_index(&self) -> Result<Option<usize>> {
        match self.leader()? {
            Some(node) => Ok(Some(self.index(&node)?)),
            None => Ok(None),
        }
    }

    fn can_reach(&self, from: usize, to: usize) -> bool {
        let (from, to) = (&self.replicas[from], &self.replicas[to]);
        from.running && to.running && !from.partitioned && !to.partitioned
    }

    fn join_queue(&self, idx: usize, client: Arc<InMemoryClient>) -> Result<Session> {
        let config = &self.replicas[idx].config;
        let seq_path = client.create(
            &format!("{}/{}-n_", self.paths.election_path, config.core_node_name),
            Vec::new(),
            CreateMode::EphemeralSequential,
        )?;
        let context = ElectionContext::from_config(config, seq_path)?;
        let election = ShardLeaderElectionContext::new(context, client.clone());
        Ok(Session { client, election })
    }

    /// Drop the replica's queue entry and queue again at the back
    fn rejoin(&mut self, idx: usize) -> Result<()> {
        let Some(old) = self.replicas[idx].session.take() else {
            return Ok(());
        };
        old.client
            .delete(old.election.context().leader_seq_path(), None)?;
        let session = self.join_queue(idx, old.client.clone())?;
        debug!(
            "{} rejoined the election queue as {}",
            self.replicas[idx].node(),
            session.seq_node()
        );
        self.replicas[idx].session = Some(session);
        Ok(())
    }

    /// Queue entries ordered by their sequence suffix
    fn queue(&self) -> Result<Vec<String>> {
        let mut entries = self.admin.get_children(&self.paths.election_path)?;
        entries.sort_by_key(|entry| sequence_of(entry));
        Ok(entries)
    }

    fn run_election(&mut self) -> Result<()> {
        if self.admin.exists(&self.paths.leader_path)?.is_some() {
            return Ok(());
        }

        let rounds = self.queue()?.len();
        for _ in 0..rounds {
            let Some(head) = self.queue()?.into_iter().next() else {
                return Ok(());
            };
            let Some(idx) = self.replicas.iter().position(|r| {
                r.session
                    .as_ref()
                    .is_some_and(|session| session.seq_node() == head)
            }) else {
                debug!("Queue head {} has no live replica", head);
                return Ok(());
            };

            let core_node_name = self.replicas[idx].core_node_name().to_string();
            if !self.terms.can_become_leader(&self.admin, &core_node_name)? {
                info!(
                    "{} is behind the highest term, rejoining the queue",
                    self.replicas[idx].node()
                );
                self.rejoin(idx)?;
                continue;
            }

            let Some(session) = self.replicas[idx].session.as_ref() else {
                return Ok(());
            };
            match session.election.become_leader() {
                Ok(Registration::Registered(token)) => {
                    info!(
                        "{} is leader with parent version {}",
                        self.replicas[idx].node(),
                        token.parent_version()
                    );
                    return Ok(());
                }
                Ok(Registration::SkippedClosed) => return Ok(()),
                Err(e) => {
                    warn!("{} failed to register: {}", self.replicas[idx].node(), e);
                    self.rejoin(idx)?;
                }
            }
        }
        Ok(())
    }

    fn recover_followers(&mut self) -> Result<()> {
        let Some(leader) = self.leader_index()? else {
            return Ok(());
        };
        let terms = self.terms.read(&self.admin)?;
        let leader_term = terms
            .get(self.replicas[leader].core_node_name())
            .copied()
            .unwrap_or_else(|| max_term(&terms));

        for idx in 0..self.replicas.len() {
            if idx == leader || !self.can_reach(leader, idx) {
                continue;
            }
            let follower = &self.replicas[idx];
            let term = terms.get(follower.core_node_name()).copied().unwrap_or(0);
            if term >= leader_term && follower.docs == self.replicas[leader].docs {
                continue;
            }

            let docs = self.replicas[leader].docs.clone();
            let core_node_name = follower.core_node_name().to_string();
            self.terms.set_term(&self.admin, &core_node_name, leader_term)?;
            let follower = &mut self.replicas[idx];
            follower.docs = docs;
            info!(
                "{} recovered from leader at term {}",
                follower.node(),
                leader_term
            );
        }
        Ok(())
    }
}

impl Replica {
    fn new(config: ShardLeaderConfig) -> Self {
        Self {
            config,
            docs: BTreeSet::new(),
            running: false,
            partitioned: false,
            session: None,
        }
    }
}

fn replica_config(i: usize) -> ShardLeaderConfig {
    ShardLeaderConfig {
        root: ROOT.to_string(),
        collection: COLLECTION.to_string(),
        shard: SHARD.to_string(),
        core_node_name: format!("core_node{i}"),
        node_name: format!("node{i}"),
        base_url: format!("http://node{i}:8983/solr"),
        core: format!("{COLLECTION}_{SHARD}_replica_n{i}"),
        ..Default::default()
    }
}

/// Sequence number a sequential node name ends with
fn sequence_of(name: &str) -> u64 {
    name.rsplit("-n_")
        .next()
        .and_then(|seq| seq.parse().ok())
        .unwrap_or(u64::MAX)
}
