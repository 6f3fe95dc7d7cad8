//! Severity classification shared by the shardlead error types
//!
//! Each crate keeps its own `thiserror` enum; this module only provides the
//! common vocabulary used to decide how loudly a failure is reported.

/// Severity levels for error classification
///
/// - **Warning**: the operation did not fully happen but the caller can carry on.
///   A failed best-effort release of a leader marker is a warning, since the
///   ephemeral marker is removed with its session anyway.
/// - **Error**: the operation failed; the system remains consistent.
/// - **Critical**: the caller's view of the world is invalid. A failed leader
///   registration or an expired coordination session is critical because the
///   caller must not act as leader.
///
/// # Examples
///
/// ```rust
/// use shardlead_common::ErrorSeverity;
///
/// let release_failed = ErrorSeverity::Warning;
/// let registration_failed = ErrorSeverity::Critical;
/// assert!(registration_failed > release_failed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Potential issue but operation can proceed
    Warning,
    /// Operation failed but system can continue
    Error,
    /// Caller must stop what it is doing
    Critical,
}

impl ErrorSeverity {
    /// Lower-case label, suitable for structured log fields
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for error types that have severity levels
///
/// # Example
///
/// ```rust
/// use shardlead_common::{ErrorSeverity, Severity};
///
/// #[derive(Debug)]
/// enum MarkerError {
///     AlreadyRegistered,
///     ReleaseFailed,
/// }
///
/// impl Severity for MarkerError {
///     fn severity(&self) -> ErrorSeverity {
///         match self {
///             MarkerError::AlreadyRegistered => ErrorSeverity::Critical,
///             MarkerError::ReleaseFailed => ErrorSeverity::Warning,
///         }
///     }
/// }
///
/// assert_eq!(MarkerError::ReleaseFailed.severity(), ErrorSeverity::Warning);
/// ```
pub trait Severity {
    /// Get the severity level of this error
    fn severity(&self) -> ErrorSeverity;

    /// Whether the caller must abandon its current course of action
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }
}
