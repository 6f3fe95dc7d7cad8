//! Error types for leader registration

use shardlead_common::{ErrorSeverity, Severity};

use crate::coordination::CoordinationError;

/// Errors that can occur while registering or releasing shard leadership
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// The registration batch did not commit; this candidate is not the leader
    #[error("Could not register as the leader because creating the ephemeral registration node {leader_path} failed: {source}")]
    Registration {
        leader_path: String,
        #[source]
        source: CoordinationError,
    },

    /// The registration batch committed without reporting the parent's version
    #[error("Registration of {leader_path} did not report the parent node version")]
    MissingParentVersion { leader_path: String },

    /// Releasing the leader marker failed
    #[error("Exception canceling election: {0}")]
    Cancellation(#[source] CoordinationError),

    /// The session that registered this candidate is gone
    #[error("Coordination session expired while canceling election: {0}")]
    SessionExpired(#[source] CoordinationError),

    /// A node path was malformed
    #[error("Invalid node path: {0}")]
    InvalidPath(String),

    /// Leader metadata could not be (de)serialized
    #[error("Leader metadata serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Severity for ElectionError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Registration { .. } | Self::MissingParentVersion { .. } | Self::SessionExpired(_) => {
                ErrorSeverity::Critical
            }
            Self::Cancellation(_) => ErrorSeverity::Warning,
            Self::InvalidPath(_) | Self::Serialization(_) => ErrorSeverity::Error,
        }
    }
}

/// Result type for election operations
pub type Result<T> = std::result::Result<T, ElectionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_election_error_display() {
        let err = ElectionError::Registration {
            leader_path: "/collections/c/leaders/shard1/leader".to_string(),
            source: CoordinationError::NodeExists {
                path: "/collections/c/leaders/shard1/leader".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("Could not register as the leader"));
        assert!(msg.contains("Node already exists"));

        let err = ElectionError::InvalidPath("leader".to_string());
        assert_eq!(err.to_string(), "Invalid node path: leader");
    }

    #[test]
    fn test_election_error_source() {
        let err = ElectionError::InvalidPath("x".to_string());
        assert!(err.source().is_none());

        let err = ElectionError::Cancellation(CoordinationError::ConnectionLoss);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_severity_policy() {
        let registration = ElectionError::Registration {
            leader_path: "/l".to_string(),
            source: CoordinationError::ConnectionLoss,
        };
        assert!(registration.is_critical());
        assert!(ElectionError::SessionExpired(CoordinationError::SessionExpired).is_critical());
        assert_eq!(
            ElectionError::Cancellation(CoordinationError::ConnectionLoss).severity(),
            ErrorSeverity::Warning
        );
    }
}
