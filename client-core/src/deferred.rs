// client-core/src/deferred.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::models::{Comment, PendingComment};
use common::storage_keys;
use uuid::Uuid;

use crate::api::CommentApi;
use crate::error::{ApiError, StorageError};
use crate::storage::KeyValueStore;

/// Time source, injected so freshness tests need no wall-clock sleeps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Outcome of a replay attempt
#[derive(Debug)]
pub enum ReplayOutcome {
    /// No deferred action was pending
    NothingPending,
    /// The record was older than the freshness window; deleted, not submitted
    Stale,
    /// The record targeted a different post; deleted, not submitted
    TargetMismatch,
    /// Submitted once; the created comment should be merged into view state
    Submitted(Comment),
    /// Submission failed after the record was already deleted. Surfaced to
    /// the caller, never retried; the drafted input is gone.
    Failed(ApiError),
}

/// Lets an unauthenticated user compose a comment now and submit it after
/// login, without losing their input.
///
/// Exactly one pending comment exists at a time. Replay is gated on the
/// presence of the stored record, and the record is removed synchronously
/// before any submission I/O, so a view re-rendering repeatedly after login
/// can never replay twice.
pub struct DeferredActionMediator {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    freshness: Duration,
}

impl DeferredActionMediator {
    pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, freshness: Duration) -> Self {
        Self {
            storage,
            clock,
            freshness,
        }
    }

    /// Default five-minute freshness window with the system clock
    pub fn with_defaults(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::new(storage, Arc::new(SystemClock), Duration::minutes(5))
    }

    /// Persist a drafted comment before redirecting to login. Overwrites any
    /// previous draft.
    pub fn stash(&self, pending: &PendingComment) -> Result<(), StorageError> {
        let raw = serde_json::to_string(pending).map_err(|e| StorageError::Corrupt {
            key: storage_keys::PENDING_COMMENT.to_string(),
            reason: e.to_string(),
        })?;
        self.storage.put(storage_keys::PENDING_COMMENT, &raw)?;
        tracing::info!("Stashed pending comment for post {}", pending.post_id);
        Ok(())
    }

    /// Whether a draft is currently stashed
    pub fn has_pending(&self) -> bool {
        matches!(self.storage.get(storage_keys::PENDING_COMMENT), Ok(Some(_)))
    }

    /// Replay the pending comment against `post_id`, at most once.
    ///
    /// The stored record is removed before any await; stale or mismatched
    /// records are dropped without submission.
    pub async fn replay(&self, post_id: &Uuid, comments: &dyn CommentApi) -> ReplayOutcome {
        let pending = match self.take_pending() {
            Some(p) => p,
            None => return ReplayOutcome::NothingPending,
        };

        if pending.post_id != *post_id {
            tracing::info!(
                "Dropping pending comment for post {}: current view is {}",
                pending.post_id,
                post_id
            );
            return ReplayOutcome::TargetMismatch;
        }

        let age = self.clock.now() - pending.created_at;
        if age > self.freshness {
            tracing::info!(
                "Dropping pending comment for post {}: {}s old",
                pending.post_id,
                age.num_seconds()
            );
            return ReplayOutcome::Stale;
        }

        match comments.create_comment(post_id, &pending.payload()).await {
            Ok(comment) => {
                tracing::info!("Replayed pending comment on post {}", post_id);
                ReplayOutcome::Submitted(comment)
            }
            Err(e) => {
                tracing::warn!("Replay of pending comment failed: {}", e);
                ReplayOutcome::Failed(e)
            }
        }
    }

    /// Remove and decode the stored record. A corrupt record is discarded.
    fn take_pending(&self) -> Option<PendingComment> {
        let raw = match self.storage.take(storage_keys::PENDING_COMMENT) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::error!("Failed to read pending comment: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(pending) => Some(pending),
            Err(e) => {
                tracing::warn!("Discarding corrupt pending comment: {}", e);
                None
            }
        }
    }
}
