//! Errors raised while driving a simulated shard

use std::time::Duration;

use shardlead_common::{ErrorSeverity, Severity};
use shardlead_election::{CoordinationError, ElectionError};

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("no replica on node {0}")]
    UnknownNode(String),

    #[error("node {0} is not running")]
    NodeStopped(String),

    #[error("shard has no leader to accept writes")]
    NoLeader,

    #[error("timed out after {timeout:?} waiting for a matching leader")]
    Timeout { timeout: Duration },

    #[error(transparent)]
    Election(#[from] ElectionError),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    #[error("malformed term table: {0}")]
    Terms(#[from] serde_json::Error),
}

impl Severity for SimulationError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout { .. } | Self::NoLeader | Self::NodeStopped(_) => ErrorSeverity::Warning,
            Self::Election(e) => e.severity(),
            _ => ErrorSeverity::Error,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
