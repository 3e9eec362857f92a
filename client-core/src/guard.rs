// client-core/src/guard.rs
use std::sync::Arc;
use std::time::Duration;

use common::storage_keys;
use common::Notice;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::ApiError;
use crate::storage::InvalidationChannel;
use crate::store::SessionStore;
use crate::token;

const SESSION_EXPIRED_NOTICE: &str = "Your session has expired. Please log in again.";

/// Watcher enforcing that the session store's claimed authentication state
/// matches a structurally valid, unexpired credential, and propagating
/// external invalidations (e.g. logout in another tab).
///
/// Checks are idempotent and convergent: running one twice in quick
/// succession leaves the same end state as running it once. An internal
/// failure during a check is logged and treated as "validation failed", so
/// the guard fails closed rather than leaving a stale authenticated state.
pub struct SessionGuard {
    inner: Arc<GuardInner>,
}

struct GuardInner {
    store: Arc<SessionStore>,
    notices: mpsc::UnboundedSender<Notice>,
    check_interval: Duration,
    focus: Notify,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionGuard {
    /// Create a guard over `store`. Returns the guard and the channel on
    /// which user-facing notices (forced logouts) are surfaced.
    pub fn new(
        store: Arc<SessionStore>,
        check_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, notices_rx) = mpsc::unbounded_channel();
        let guard = Self {
            inner: Arc::new(GuardInner {
                store,
                notices,
                check_interval,
                focus: Notify::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        };
        (guard, notices_rx)
    }

    /// Activate the guard: one immediate check, a periodic check, the
    /// storage invalidation listener and the focus listener. All spawned
    /// tasks are released by [`shutdown`] or on drop.
    pub fn start(&self, channel: &dyn InvalidationChannel) {
        let inner = &self.inner;
        inner.run_check();

        let mut tasks = inner.tasks.lock();

        // Periodic check
        let periodic = inner.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(periodic.check_interval);
            // First tick fires immediately; the activation check covered it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                periodic.run_check();
            }
        }));

        // External invalidation: the durable session entry was cleared by
        // another context sharing the storage
        let external = inner.clone();
        let mut events = channel.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if event.key == storage_keys::SESSION && event.value.is_none() {
                            external.on_external_invalidation();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Storage event listener lagged by {}, re-checking", n);
                        external.run_check();
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        // Focus: re-run the check when the view regains focus, catching
        // expiry that happened while backgrounded
        let focused = inner.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                focused.focus.notified().await;
                focused.run_check();
            }
        }));
    }

    /// Signal that the view regained focus
    pub fn notify_focus(&self) {
        self.inner.focus.notify_one();
    }

    /// Classify a caught API error: a 401 forces logout and is reported as
    /// handled; anything else is left to the caller.
    pub fn handle_error(&self, err: &ApiError) -> bool {
        if err.is_unauthorized() {
            tracing::warn!("Unauthorized response, forcing logout");
            self.inner.force_logout();
            true
        } else {
            false
        }
    }

    /// Clear the session and surface a notice, usable from anywhere
    pub fn force_logout(&self) {
        self.inner.force_logout();
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.store.is_authenticated()
    }

    /// Run one validity check now. Exposed for callers that want to combine
    /// it with their own error handling.
    pub fn check_now(&self) {
        self.inner.run_check();
    }

    /// Release every spawned task. Called automatically on drop.
    pub fn shutdown(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl GuardInner {
    /// One validity check. Never panics outward: any internal failure is
    /// treated as a failed validation.
    fn run_check(&self) {
        let healthy = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.check_session()
        }))
        .unwrap_or_else(|_| {
            tracing::error!("Session check panicked, treating as invalid");
            false
        });

        if !healthy {
            self.force_logout();
        }
    }

    /// True when the session is healthy or there is nothing to enforce
    fn check_session(&self) -> bool {
        let snapshot = self.store.snapshot();
        if !snapshot.is_authenticated {
            return true;
        }

        // The store's own check plus an independent pass over the raw
        // credential
        if !self.store.check_token_validity() {
            tracing::warn!("Stored credential failed the store's validity check");
            return false;
        }

        let analysis = token::analyze(snapshot.token.as_deref());
        if !analysis.valid {
            tracing::warn!(
                "Stored credential failed validation: {}",
                analysis.reason.as_deref().unwrap_or("unknown")
            );
            return false;
        }

        true
    }

    fn force_logout(&self) {
        if self.store.is_authenticated() {
            let _ = self.notices.send(Notice::warning(SESSION_EXPIRED_NOTICE));
        }
        // Idempotent; a concurrent check reaching here is harmless
        self.store.logout();
    }

    /// Another context cleared the durable session entry: drop the in-memory
    /// session without touching storage again
    fn on_external_invalidation(&self) {
        if self.store.is_authenticated() {
            tracing::info!("Session cleared externally, logging out this context");
            let _ = self.notices.send(Notice::warning(SESSION_EXPIRED_NOTICE));
            self.store.logout();
        }
    }
}
