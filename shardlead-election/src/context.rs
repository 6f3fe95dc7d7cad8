//! Candidate identity shared by every election context variant

use shardlead_config::ShardLeaderConfig;

use crate::error::Result;
use crate::paths::{parent_path, ElectionPaths};
use crate::props::LeaderProps;

/// Immutable identity of one candidate in one election round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionContext {
    id: String,
    election_path: String,
    leader_path: String,
    leader_seq_path: String,
    leader_props: LeaderProps,
}

impl ElectionContext {
    /// `leader_seq_path` is the candidate's queue entry, created by the
    /// election queue before this context is built.
    pub fn new(
        id: impl Into<String>,
        election_path: impl Into<String>,
        leader_path: impl Into<String>,
        leader_seq_path: impl Into<String>,
        leader_props: LeaderProps,
    ) -> Result<Self> {
        let context = Self {
            id: id.into(),
            election_path: election_path.into(),
            leader_path: leader_path.into(),
            leader_seq_path: leader_seq_path.into(),
            leader_props,
        };
        parent_path(&context.election_path)?;
        parent_path(&context.leader_path)?;
        parent_path(&context.leader_seq_path)?;
        Ok(context)
    }

    /// Identity of the candidate described by `config`
    pub fn from_config(config: &ShardLeaderConfig, leader_seq_path: impl Into<String>) -> Result<Self> {
        let paths = ElectionPaths::for_shard(&config.root, &config.collection, &config.shard);
        Self::new(
            config.core_node_name.clone(),
            paths.election_path,
            paths.leader_path,
            leader_seq_path,
            LeaderProps::from_config(config),
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn election_path(&self) -> &str {
        &self.election_path
    }

    pub fn leader_path(&self) -> &str {
        &self.leader_path
    }

    pub fn leader_seq_path(&self) -> &str {
        &self.leader_seq_path
    }

    pub fn leader_props(&self) -> &LeaderProps {
        &self.leader_props
    }

    /// Parent of the leader marker; its data version is the ownership token
    pub fn leader_parent_path(&self) -> &str {
        // Validated in `new`
        parent_path(&self.leader_path).unwrap_or("/")
    }

    /// Serialized payload of the leader marker
    pub fn leader_metadata(&self) -> Result<Vec<u8>> {
        self.leader_props.to_bytes()
    }
}

/// Extension point run on every cancellation, before the marker is released
///
/// Used for bookkeeping unrelated to the marker node itself.
pub trait CancelHook: Send + Sync {
    fn on_cancel(&self, context: &ElectionContext);
}

/// Hook that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCancelHook;

impl CancelHook for NoopCancelHook {
    fn on_cancel(&self, _context: &ElectionContext) {}
}

impl<F> CancelHook for F
where
    F: Fn(&ElectionContext) + Send + Sync,
{
    fn on_cancel(&self, context: &ElectionContext) {
        self(context)
    }
}
