//! Versioned registration and release of a shard's leader marker
//!
//! Registration commits one batch: check that our queue entry still exists,
//! create the ephemeral leader marker, and bump the data version of the
//! marker's parent. The parent version returned by that batch is the only
//! proof that the marker is ours. Release runs a batch guarded by a check of
//! that exact version, so a candidate can never delete a successor's marker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shardlead_common::Pretty;
use tracing::{debug, error, info, warn};

use crate::coordination::{
    CoordinationClient, CoordinationError, CreateMode, FailureKind, Op, OpResult,
};
use crate::context::{CancelHook, ElectionContext, NoopCancelHook};
use crate::error::{ElectionError, Result};

/// Proof of a committed registration: the leader parent's data version
/// right after our batch bumped it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaderToken {
    parent_version: i32,
}

impl LeaderToken {
    pub fn parent_version(&self) -> i32 {
        self.parent_version
    }
}

/// Outcome of [`ShardLeaderElectionContext::become_leader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The marker is ours
    Registered(LeaderToken),
    /// The context or its client was closed; nothing was sent
    SkippedClosed,
}

impl Registration {
    pub fn token(&self) -> Option<LeaderToken> {
        match self {
            Self::Registered(token) => Some(*token),
            Self::SkippedClosed => None,
        }
    }
}

/// Outcome of [`ShardLeaderElectionContext::cancel_election`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Our marker and queue entry were deleted
    Released,
    /// The marker or queue entry was already gone; nothing was deleted
    AlreadyGone,
    /// No token was held, so nothing was deleted
    NotRegistered,
    /// The client is not connected; nothing was attempted
    Disconnected,
    /// The release was interrupted; the caller should stop retrying
    Interrupted,
    /// The release failed and was logged; the ephemeral marker goes away with its session
    Failed,
}

impl CancelOutcome {
    /// Whether this candidate has nothing left to release
    ///
    /// For `AlreadyGone` the batch was rolled back, so a marker whose queue
    /// entry vanished stays in place until its session ends.
    pub fn is_released(self) -> bool {
        matches!(self, Self::Released | Self::AlreadyGone)
    }
}

/// Leader registration context for one candidate of one shard
///
/// Built when the candidate enters an election round and discarded after
/// [`close`](Self::close); never reused for a later round.
pub struct ShardLeaderElectionContext {
    context: ElectionContext,
    client: Arc<dyn CoordinationClient>,
    hook: Box<dyn CancelHook>,
    closed: AtomicBool,
    /// Exclusive section for registration and release; holds the token
    token: Mutex<Option<LeaderToken>>,
}

impl ShardLeaderElectionContext {
    pub fn new(context: ElectionContext, client: Arc<dyn CoordinationClient>) -> Self {
        Self {
            context,
            client,
            hook: Box::new(NoopCancelHook),
            closed: AtomicBool::new(false),
            token: Mutex::new(None),
        }
    }

    pub fn with_cancel_hook(mut self, hook: impl CancelHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    pub fn context(&self) -> &ElectionContext {
        &self.context
    }

    /// Register as the shard leader
    ///
    /// Only call this after winning the election vote. Any failure means this
    /// candidate is not the leader; there is no internal retry.
    pub fn become_leader(&self) -> Result<Registration> {
        let mut slot = self.lock_token();

        if self.is_closed() {
            info!("Bailing on becoming leader, we are closed");
            return Ok(Registration::SkippedClosed);
        }

        let leader_path = self.context.leader_path();
        let parent = self.context.leader_parent_path();
        info!(
            "Creating leader registration node {} after winning as {}",
            leader_path,
            self.context.leader_seq_path()
        );

        debug!("Publishing leader props {}", Pretty(self.context.leader_props()));

        let acl = self.client.acl_provider().acls_to_add(leader_path);
        let ops = vec![
            Op::check(self.context.leader_seq_path(), None),
            Op::create(
                leader_path,
                self.context.leader_metadata()?,
                acl,
                CreateMode::Ephemeral,
            ),
            // No payload change; the point is the version bump
            Op::set_data(parent, None, None),
        ];

        let results = self
            .client
            .multi(ops)
            .map_err(|source| ElectionError::Registration {
                leader_path: leader_path.to_string(),
                source,
            })?;
        debug!("Results from registration batch {:?}", results);

        let parent_version = results
            .iter()
            .find_map(|result| match result {
                OpResult::SetData { stat } => Some(stat.version),
                _ => None,
            })
            .ok_or_else(|| ElectionError::MissingParentVersion {
                leader_path: leader_path.to_string(),
            })?;

        let token = LeaderToken { parent_version };
        *slot = Some(token);
        info!(
            "Registered {} as leader at {} with parent version {}",
            self.context.id(),
            leader_path,
            parent_version
        );
        Ok(Registration::Registered(token))
    }

    /// Release the leader marker if, and only if, it is still ours
    ///
    /// Safe to call when registration never happened and safe to call
    /// repeatedly. The only error is an expired session.
    pub fn cancel_election(&self) -> Result<CancelOutcome> {
        let mut slot = self.lock_token();

        if !self.client.is_connected() {
            info!("Can't cancel, coordination client is not connected");
            return Ok(CancelOutcome::Disconnected);
        }

        self.hook.on_cancel(&self.context);

        let Some(token) = slot.take() else {
            info!("No version found for ephemeral leader parent node, won't remove previous leader registration.");
            return Ok(CancelOutcome::NotRegistered);
        };

        self.release(token)
    }

    /// Issue the guarded delete batch; requires a token by construction
    fn release(&self, token: LeaderToken) -> Result<CancelOutcome> {
        let leader_path = self.context.leader_path();
        debug!(
            "Removing leader registration node on cancel: {} {}",
            leader_path, token.parent_version
        );

        let ops = vec![
            Op::check(self.context.leader_parent_path(), Some(token.parent_version)),
            Op::delete(self.context.leader_seq_path(), None),
            Op::delete(leader_path, None),
        ];

        match self.client.multi(ops) {
            Ok(_) => Ok(CancelOutcome::Released),
            Err(e) => Self::classify_release_failure(e),
        }
    }

    fn classify_release_failure(e: CoordinationError) -> Result<CancelOutcome> {
        match e.kind() {
            FailureKind::NoNode => {
                debug!("Leader registration already removed: {}", e);
                Ok(CancelOutcome::AlreadyGone)
            }
            FailureKind::SessionExpired => {
                warn!("Coordination session expired");
                Err(ElectionError::SessionExpired(e))
            }
            FailureKind::Interrupted => {
                info!("Canceling election interrupted: {}", e);
                Ok(CancelOutcome::Interrupted)
            }
            FailureKind::Other => {
                let err = ElectionError::Cancellation(e);
                error!("Exception trying to cancel election: {}", err);
                Ok(CancelOutcome::Failed)
            }
        }
    }

    /// Mark the context closed and release the marker
    ///
    /// Never fails: problems are logged.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        match self.cancel_election() {
            Ok(outcome) => debug!("Closed election context {}: {:?}", self.context.id(), outcome),
            Err(e) => error!("Exception canceling election: {}", e),
        }
    }

    /// Closed locally, or the client itself is closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.client.is_closed()
    }

    /// Token held from the last successful registration, if not yet released
    pub fn ownership_token(&self) -> Option<LeaderToken> {
        *self.lock_token()
    }

    fn lock_token(&self) -> MutexGuard<'_, Option<LeaderToken>> {
        // The slot is a plain value; a panic elsewhere cannot leave it half-written
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ShardLeaderElectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardLeaderElectionContext")
            .field("context", &self.context)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            // Never block: the slot is held while registering or releasing
            .field("token", &self.token.try_lock().ok().map(|slot| *slot))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::ErrorCode;

    fn failed(source: CoordinationError) -> CoordinationError {
        CoordinationError::Transaction {
            index: 0,
            results: vec![OpResult::Error(
                source.code().unwrap_or(ErrorCode::RuntimeInconsistency),
            )],
            source: Box::new(source),
        }
    }

    #[test]
    fn test_classify_no_node_as_already_gone() {
        let outcome = ShardLeaderElectionContext::classify_release_failure(failed(
            CoordinationError::NoNode {
                path: "/seq".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(outcome, CancelOutcome::AlreadyGone);
        assert!(outcome.is_released());
    }

    #[test]
    fn test_classify_session_expired_propagates() {
        let result = ShardLeaderElectionContext::classify_release_failure(
            CoordinationError::SessionExpired,
        );
        assert!(matches!(result, Err(ElectionError::SessionExpired(_))));
    }

    #[test]
    fn test_classify_interrupted_and_closed() {
        for e in [CoordinationError::Interrupted, CoordinationError::Closed] {
            assert_eq!(
                ShardLeaderElectionContext::classify_release_failure(e).unwrap(),
                CancelOutcome::Interrupted
            );
        }
    }

    #[test]
    fn test_classify_bad_version_is_swallowed() {
        let outcome = ShardLeaderElectionContext::classify_release_failure(failed(
            CoordinationError::BadVersion {
                path: "/leaders/shard1".to_string(),
                expected: 1,
                actual: 2,
            },
        ))
        .unwrap();
        assert_eq!(outcome, CancelOutcome::Failed);
        assert!(!outcome.is_released());
    }

    #[test]
    fn test_debug_does_not_wait_for_token_slot() {
        let coordinator = crate::memory::InMemoryCoordinator::new();
        let context = ElectionContext::new(
            "core_node1",
            "/c/leader_elect/shard1/election",
            "/c/leaders/shard1/leader",
            "/c/leader_elect/shard1/election/core_node1-n_0000000000",
            crate::props::LeaderProps::default(),
        )
        .unwrap();
        let leader = ShardLeaderElectionContext::new(context, Arc::new(coordinator.connect()));

        let _held = leader.lock_token();
        let rendered = format!("{leader:?}");

        assert!(rendered.contains("core_node1"));
        assert!(rendered.contains("token: None"));
    }

    #[test]
    fn test_registration_token_accessor() {
        let token = LeaderToken { parent_version: 4 };
        assert_eq!(Registration::Registered(token).token(), Some(token));
        assert_eq!(Registration::SkippedClosed.token(), None);
        assert_eq!(token.parent_version(), 4);
    }
}
