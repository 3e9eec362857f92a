// client-core/src/storage.rs
use common::models::UiPrefs;
use common::storage_keys;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::StorageError;

/// Change notification emitted when a storage entry is written or removed.
/// `value: None` means the entry was cleared. This is the generic form of the
/// platform "storage changed" signal used for cross-tab invalidation.
#[derive(Debug, Clone)]
pub struct StorageEvent {
    pub key: String,
    pub value: Option<String>,
}

/// Durable key-value storage backing the session record, the pending
/// deferred comment and the UI preferences. Writes must be visible to a
/// subsequent `get` before the call returns.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Remove and return the entry in one step
    fn take(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// External invalidation channel: lets a session guard observe storage
/// changes made by another context sharing the same backing store.
pub trait InvalidationChannel: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

/// In-process storage shared between contexts, with change broadcast.
/// Two session stores holding the same `MemoryStore` behave like two browser
/// tabs sharing localStorage.
pub struct MemoryStore {
    entries: DashMap<String, String>,
    changes: broadcast::Sender<StorageEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(32);
        Self {
            entries: DashMap::new(),
            changes,
        }
    }

    fn notify(&self, key: &str, value: Option<String>) {
        // Nobody listening is fine
        let _ = self.changes.send(StorageEvent {
            key: key.to_string(),
            value,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    fn take(&self, key: &str) -> Result<Option<String>, StorageError> {
        let removed = self.entries.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.notify(key, None);
        }
        Ok(removed)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.take(key)?;
        Ok(())
    }
}

impl InvalidationChannel for MemoryStore {
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.changes.subscribe()
    }
}

/// Load the persisted UI preferences, falling back to defaults on a missing
/// or corrupt entry
pub fn load_ui_prefs(storage: &dyn KeyValueStore) -> UiPrefs {
    match storage.get(storage_keys::UI_PREFS) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("Discarding corrupt UI preferences: {}", e);
            UiPrefs::default()
        }),
        _ => UiPrefs::default(),
    }
}

/// Persist the UI preferences
pub fn save_ui_prefs(storage: &dyn KeyValueStore, prefs: &UiPrefs) -> Result<(), StorageError> {
    let raw = serde_json::to_string(prefs).map_err(|e| StorageError::Corrupt {
        key: storage_keys::UI_PREFS.to_string(),
        reason: e.to_string(),
    })?;
    storage.put(storage_keys::UI_PREFS, &raw)
}
