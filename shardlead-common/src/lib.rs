//! # shardlead common
//!
//! Foundational pieces shared by the shardlead crates:
//!
//! - [`error`] - severity classification for error enums
//! - [`logging`] - helpers for rendering values in log lines

pub mod error;
pub mod logging;

pub use error::{ErrorSeverity, Severity};
pub use logging::Pretty;
