// client-core/src/store.rs
use std::sync::Arc;

use common::models::{SessionRecord, User};
use common::storage_keys;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::StorageError;
use crate::storage::KeyValueStore;
use crate::token;

/// Single authoritative record of authentication state, durable across
/// reloads.
///
/// All mutation goes through the transition methods below; each transition is
/// applied and persisted under one lock, so no caller can observe a partially
/// applied state (e.g. `user` set but `is_authenticated` still false after
/// `login`). Readers take a snapshot or subscribe to the change feed.
pub struct SessionStore {
    state: Mutex<SessionRecord>,
    storage: Arc<dyn KeyValueStore>,
    changes: watch::Sender<SessionRecord>,
    hydrated: watch::Sender<bool>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (changes, _) = watch::channel(SessionRecord::empty());
        let (hydrated, _) = watch::channel(false);
        Self {
            state: Mutex::new(SessionRecord::empty()),
            storage,
            changes,
            hydrated,
        }
    }

    /// Rehydrate from durable storage. Must run before dependent components
    /// read the store; completion is observable through [`hydration`].
    ///
    /// A stored record whose credential no longer validates is discarded and
    /// the durable entry cleared, so a reload never resurrects an expired
    /// session.
    pub fn hydrate(&self) -> Result<(), StorageError> {
        let loaded = match self.storage.get(storage_keys::SESSION)? {
            Some(raw) => match serde_json::from_str::<SessionRecord>(&raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Discarding corrupt session record: {}", e);
                    self.storage.remove(storage_keys::SESSION)?;
                    None
                }
            },
            None => None,
        };

        let mut state = self.state.lock();
        match loaded {
            Some(record)
                if record.is_complete() && token::analyze(record.token.as_deref()).valid =>
            {
                tracing::info!("Session restored from storage");
                *state = record;
                state.is_authenticated = true;
            }
            Some(_) => {
                tracing::info!("Stored session is incomplete or expired, clearing");
                *state = SessionRecord::empty();
                self.storage.remove(storage_keys::SESSION)?;
            }
            None => {
                *state = SessionRecord::empty();
            }
        }
        let _ = self.changes.send(state.clone());
        drop(state);

        let _ = self.hydrated.send(true);
        Ok(())
    }

    /// Observe hydration completion
    pub fn hydration(&self) -> watch::Receiver<bool> {
        self.hydrated.subscribe()
    }

    pub fn is_hydrated(&self) -> bool {
        *self.hydrated.subscribe().borrow()
    }

    /// Current state, as one consistent copy
    pub fn snapshot(&self) -> SessionRecord {
        self.state.lock().clone()
    }

    /// Change feed; receivers see every committed transition
    pub fn subscribe(&self) -> watch::Receiver<SessionRecord> {
        self.changes.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().is_authenticated
    }

    /// Merge an identity into the record and mark it authenticated
    pub fn set_user(&self, user: User) {
        self.transition(|state| {
            state.user = Some(user);
            state.is_authenticated = true;
        });
    }

    /// Store the bearer credential. Does not by itself flip the
    /// authenticated flag.
    pub fn set_token(&self, token: String) {
        self.transition(|state| {
            state.token = Some(token);
        });
    }

    /// Atomic transition into the authenticated state. The only sanctioned
    /// entry point from a credential exchange.
    pub fn login(&self, user: User, token: String) {
        self.transition(|state| {
            state.user = Some(user);
            state.token = Some(token);
            state.is_authenticated = true;
            state.last_error = None;
        });
        tracing::info!("Session store: logged in");
    }

    /// Clear the whole record in one step. Safe to call when already logged
    /// out.
    pub fn logout(&self) {
        let mut state = self.state.lock();
        *state = SessionRecord::empty();
        if let Err(e) = self.storage.remove(storage_keys::SESSION) {
            tracing::error!("Failed to clear persisted session: {}", e);
        }
        let _ = self.changes.send(state.clone());
        drop(state);
        tracing::info!("Session store: logged out");
    }

    pub fn set_loading(&self, loading: bool) {
        let mut state = self.state.lock();
        state.is_loading = loading;
        let _ = self.changes.send(state.clone());
    }

    pub fn set_error(&self, message: Option<String>) {
        let mut state = self.state.lock();
        state.last_error = message;
        let _ = self.changes.send(state.clone());
    }

    pub fn clear_error(&self) {
        self.set_error(None);
    }

    /// Whether the stored credential is present, structurally valid and
    /// unexpired right now. Pure read; the caller decides whether a `false`
    /// warrants a logout.
    pub fn check_token_validity(&self) -> bool {
        let token = self.state.lock().token.clone();
        token::analyze(token.as_deref()).valid
    }

    /// Apply a mutation and persist the result before returning. The watch
    /// update is sent while the lock is held so the feed observes
    /// transitions in commit order.
    fn transition(&self, apply: impl FnOnce(&mut SessionRecord)) {
        let mut state = self.state.lock();
        apply(&mut state);
        self.persist(&state);
        let _ = self.changes.send(state.clone());
    }

    fn persist(&self, state: &SessionRecord) {
        match serde_json::to_string(state) {
            Ok(raw) => {
                if let Err(e) = self.storage.put(storage_keys::SESSION, &raw) {
                    tracing::error!("Failed to persist session record: {}", e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize session record: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "ada".to_string(),
            display_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            roles: vec!["USER".to_string()],
            avatar_url: None,
        }
    }

    fn fresh_token() -> String {
        let exp = Utc::now() + Duration::hours(1);
        token::make_token(&json!({"sub": "ada", "exp": exp.timestamp()}))
    }

    #[test]
    fn test_login_is_atomic() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store.login(test_user(), fresh_token());

        let snapshot = store.snapshot();
        assert!(snapshot.is_authenticated);
        assert!(snapshot.user.is_some());
        assert!(snapshot.token.is_some());
        assert_eq!(snapshot.last_error, None);
    }

    #[test]
    fn test_logout_is_idempotent() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store.login(test_user(), fresh_token());

        store.logout();
        let first = store.snapshot();
        store.logout();
        let second = store.snapshot();

        assert_eq!(first, second);
        assert_eq!(second, SessionRecord::empty());
    }

    #[test]
    fn test_persists_across_rehydration() {
        let storage = Arc::new(MemoryStore::new());
        let user = test_user();
        let token = fresh_token();

        let store = SessionStore::new(storage.clone());
        store.login(user.clone(), token.clone());

        // Simulate a reload: a fresh store over the same storage
        let reloaded = SessionStore::new(storage);
        reloaded.hydrate().unwrap();

        let snapshot = reloaded.snapshot();
        assert!(snapshot.is_authenticated);
        assert_eq!(snapshot.user, Some(user));
        assert_eq!(snapshot.token, Some(token));
        assert!(reloaded.is_hydrated());
    }

    #[test]
    fn test_hydration_discards_expired_session() {
        let storage = Arc::new(MemoryStore::new());
        let expired =
            token::make_token(&json!({"sub": "ada", "exp": Utc::now().timestamp() - 10}));

        let store = SessionStore::new(storage.clone());
        store.login(test_user(), expired);

        let reloaded = SessionStore::new(storage.clone());
        reloaded.hydrate().unwrap();

        assert_eq!(reloaded.snapshot(), SessionRecord::empty());
        assert_eq!(storage.get(storage_keys::SESSION).unwrap(), None);
    }

    #[test]
    fn test_check_token_validity() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        assert!(!store.check_token_validity());

        store.login(test_user(), fresh_token());
        assert!(store.check_token_validity());

        let expired =
            token::make_token(&json!({"sub": "ada", "exp": Utc::now().timestamp() - 10}));
        store.set_token(expired);
        assert!(!store.check_token_validity());
    }

    #[test]
    fn test_set_token_alone_does_not_authenticate() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store.set_token(fresh_token());
        assert!(!store.is_authenticated());
    }
}
