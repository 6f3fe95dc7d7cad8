//! Test utilities for shardlead crates
//!
//! Provides a deterministic stand-in for the parts of a search cluster that
//! surround leader registration: the election queue, the gate that keeps a
//! stale replica from taking over, document writes, and follower recovery.
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use shardlead_test_utils::SimulatedShard;
//!
//! let mut shard = SimulatedShard::new(3).unwrap();
//! shard
//!     .wait_for_leader(Duration::from_secs(10), |leader| leader == "node0")
//!     .unwrap();
//! shard.add_docs(1..=3).unwrap();
//! ```

mod cluster;
mod error;
pub mod terms;

pub use cluster::{SimulatedShard, COLLECTION, SHARD};
pub use error::{Result, SimulationError};
pub use terms::ShardTerms;
