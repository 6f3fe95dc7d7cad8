//! Contract of the linearizable coordination service
//!
//! The registration protocol relies on exactly what a ZooKeeper-style service
//! offers: ordered multi-operation batches that commit atomically, ephemeral
//! nodes tied to a client session, and per-node version counters usable as
//! compare-and-swap preconditions.

use thiserror::Error;

use crate::acl::{Acl, AclProvider};

/// Identifier of a client session
pub type SessionId = i64;

/// How a node is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    PersistentSequential,
    /// Removed when the creating session ends
    Ephemeral,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(self, Self::PersistentSequential | Self::EphemeralSequential)
    }
}

/// Node metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Data version, bumped by every set-data
    pub version: i32,
    /// Child version, bumped by every child create or delete
    pub cversion: i32,
    /// Owning session for ephemeral nodes
    pub ephemeral_owner: Option<SessionId>,
}

/// One operation of a multi-operation batch
///
/// A `version` of `None` matches any version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Check {
        path: String,
        version: Option<i32>,
    },
    Create {
        path: String,
        data: Vec<u8>,
        acl: Vec<Acl>,
        mode: CreateMode,
    },
    /// `data: None` keeps the current payload but still bumps the version
    SetData {
        path: String,
        data: Option<Vec<u8>>,
        version: Option<i32>,
    },
    Delete {
        path: String,
        version: Option<i32>,
    },
}

impl Op {
    pub fn check(path: impl Into<String>, version: Option<i32>) -> Self {
        Self::Check {
            path: path.into(),
            version,
        }
    }

    pub fn create(path: impl Into<String>, data: Vec<u8>, acl: Vec<Acl>, mode: CreateMode) -> Self {
        Self::Create {
            path: path.into(),
            data,
            acl,
            mode,
        }
    }

    pub fn set_data(path: impl Into<String>, data: Option<Vec<u8>>, version: Option<i32>) -> Self {
        Self::SetData {
            path: path.into(),
            data,
            version,
        }
    }

    pub fn delete(path: impl Into<String>, version: Option<i32>) -> Self {
        Self::Delete {
            path: path.into(),
            version,
        }
    }

    /// Path the operation targets
    pub fn path(&self) -> &str {
        match self {
            Self::Check { path, .. }
            | Self::Create { path, .. }
            | Self::SetData { path, .. }
            | Self::Delete { path, .. } => path,
        }
    }
}

/// Per-operation status codes reported for a failed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The operation itself was fine; the batch was rolled back
    Ok,
    /// The operation was not attempted because an earlier one failed
    RuntimeInconsistency,
    NoNode,
    NodeExists,
    BadVersion,
    NotEmpty,
    NoChildrenForEphemerals,
}

/// Result of one operation of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResult {
    Check,
    /// Actual path of the created node (differs for sequential nodes)
    Create { path: String },
    SetData { stat: Stat },
    Delete,
    Error(ErrorCode),
}

/// Coarse failure categories the registration protocol reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The target is already gone
    NoNode,
    /// The client session is no longer valid
    SessionExpired,
    /// Cooperative abort
    Interrupted,
    Other,
}

/// Errors reported by a coordination client
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("Node does not exist: {path}")]
    NoNode { path: String },

    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    #[error("Version mismatch for {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    #[error("Node has children: {path}")]
    NotEmpty { path: String },

    #[error("Ephemeral node cannot have children: {path}")]
    NoChildrenForEphemerals { path: String },

    #[error("Session expired")]
    SessionExpired,

    #[error("Connection to the coordination service lost")]
    ConnectionLoss,

    #[error("Operation interrupted")]
    Interrupted,

    #[error("Coordination client is closed")]
    Closed,

    /// A successful batch did not report the result its operation implies
    #[error("Missing {expected} result for {path}")]
    UnexpectedResult { path: String, expected: &'static str },

    /// A batch failed; nothing in it was applied
    #[error("Transaction failed at operation {index}: {source}")]
    Transaction {
        index: usize,
        results: Vec<OpResult>,
        #[source]
        source: Box<CoordinationError>,
    },
}

impl CoordinationError {
    /// Classify the failure
    ///
    /// A failed batch is classified by its failing operation. A closed client
    /// counts as an interruption.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoNode { .. } => FailureKind::NoNode,
            Self::SessionExpired => FailureKind::SessionExpired,
            Self::Interrupted | Self::Closed => FailureKind::Interrupted,
            Self::Transaction { source, .. } => source.kind(),
            _ => FailureKind::Other,
        }
    }

    /// Status code an operation failing with this error reports in a batch
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::NoNode { .. } => Some(ErrorCode::NoNode),
            Self::NodeExists { .. } => Some(ErrorCode::NodeExists),
            Self::BadVersion { .. } => Some(ErrorCode::BadVersion),
            Self::NotEmpty { .. } => Some(ErrorCode::NotEmpty),
            Self::NoChildrenForEphemerals { .. } => Some(ErrorCode::NoChildrenForEphemerals),
            Self::Transaction { source, .. } => source.code(),
            _ => None,
        }
    }

    /// Strip the batch wrapper, leaving the error of the failing operation
    pub fn into_root(self) -> Self {
        match self {
            Self::Transaction { source, .. } => source.into_root(),
            other => other,
        }
    }

    /// Per-operation results of a failed batch, if any
    pub fn results(&self) -> &[OpResult] {
        match self {
            Self::Transaction { results, .. } => results,
            _ => &[],
        }
    }
}

pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

/// A blocking client handle bound to one session of the coordination service
///
/// Every call is a network round trip; callers should run their election work
/// on a dedicated worker.
pub trait CoordinationClient: Send + Sync {
    /// Submit an ordered batch that commits atomically
    ///
    /// On success there is one result per operation. On failure nothing was
    /// applied and the error is a [`CoordinationError::Transaction`].
    fn multi(&self, ops: Vec<Op>) -> CoordinationResult<Vec<OpResult>>;

    fn get_data(&self, path: &str) -> CoordinationResult<(Vec<u8>, Stat)>;

    fn exists(&self, path: &str) -> CoordinationResult<Option<Stat>>;

    /// Child names (not full paths), in no particular order
    fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>>;

    /// Liveness of the local connection, not of the cluster
    fn is_connected(&self) -> bool;

    /// Whether the local handle has been closed
    fn is_closed(&self) -> bool;

    fn session_id(&self) -> SessionId;

    /// ACLs attached to nodes this client creates
    fn acl_provider(&self) -> &dyn AclProvider;

    /// Create a single node, returning its actual path
    fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> CoordinationResult<String> {
        let acl = self.acl_provider().acls_to_add(path);
        let results = self
            .multi(vec![Op::create(path, data, acl, mode)])
            .map_err(CoordinationError::into_root)?;
        match results.into_iter().next() {
            Some(OpResult::Create { path }) => Ok(path),
            // A sequential create has no other way to learn its actual path
            _ => Err(CoordinationError::UnexpectedResult {
                path: path.to_string(),
                expected: "create",
            }),
        }
    }

    fn set_data(&self, path: &str, data: Vec<u8>, version: Option<i32>) -> CoordinationResult<Stat> {
        let results = self
            .multi(vec![Op::set_data(path, Some(data), version)])
            .map_err(CoordinationError::into_root)?;
        match results.into_iter().next() {
            Some(OpResult::SetData { stat }) => Ok(stat),
            _ => self
                .exists(path)?
                .ok_or_else(|| CoordinationError::NoNode {
                    path: path.to_string(),
                }),
        }
    }

    fn delete(&self, path: &str, version: Option<i32>) -> CoordinationResult<()> {
        self.multi(vec![Op::delete(path, version)])
            .map(|_| ())
            .map_err(CoordinationError::into_root)
    }

    /// Create `path` and any missing ancestors as persistent nodes
    fn make_path(&self, path: &str) -> CoordinationResult<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            match self.create(&current, Vec::new(), CreateMode::Persistent) {
                Ok(_) | Err(CoordinationError::NodeExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
