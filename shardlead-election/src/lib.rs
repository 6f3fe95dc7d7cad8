//! Shard leader registration on a linearizable coordination service.
//!
//! Once a candidate has won its shard's election vote, it claims an ephemeral
//! leader marker and, later, releases exactly its own marker and never a
//! successor's, even when its session has expired in between.
//!
//! # Overview
//!
//! - **One atomic batch to register**: check the candidate's queue entry, create
//!   the ephemeral marker, and bump the data version of the marker's parent
//! - **Version token**: the bumped parent version is captured as a [`LeaderToken`]
//! - **Guarded release**: the delete batch checks the parent still has that
//!   version, so it can only succeed while the marker is ours
//! - **Loud registration, quiet release**: registration failures are errors;
//!   release failures are logged, except an expired session
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use shardlead_election::{
//!     ElectionContext, InMemoryCoordinator, Registration, ShardLeaderElectionContext,
//! };
//!
//! let coordinator = InMemoryCoordinator::new();
//! let client = Arc::new(coordinator.connect());
//!
//! // `seq_path` is this candidate's queue entry, created by the election queue
//! let context = ElectionContext::from_config(&config, seq_path)?;
//! let leader = ShardLeaderElectionContext::new(context, client);
//!
//! match leader.become_leader()? {
//!     Registration::Registered(token) => println!("leader, parent version {}", token.parent_version()),
//!     Registration::SkippedClosed => println!("closed before registering"),
//! }
//!
//! // On step-down; never fails
//! leader.close();
//! ```

pub mod acl;
pub mod context;
pub mod coordination;
mod error;
pub mod memory;
pub mod paths;
pub mod props;
mod shard_leader;

pub use acl::{Acl, AclProvider, DigestAclProvider, OpenAclProvider, Perms};
pub use context::{CancelHook, ElectionContext, NoopCancelHook};
pub use coordination::{
    CoordinationClient, CoordinationError, CoordinationResult, CreateMode, ErrorCode, FailureKind,
    Op, OpResult, SessionId, Stat,
};
pub use error::{ElectionError, Result};
pub use memory::{InMemoryClient, InMemoryCoordinator};
pub use paths::ElectionPaths;
pub use props::LeaderProps;
pub use shard_leader::{CancelOutcome, LeaderToken, Registration, ShardLeaderElectionContext};
