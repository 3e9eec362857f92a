// common/src/models/prefs.rs
use serde::{Deserialize, Serialize};

/// Theme/sidebar preference. Shares the durable storage mechanism with the
/// session record but carries no session logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiPrefs {
    pub theme: String,
    pub sidebar_collapsed: bool,
}

impl Default for UiPrefs {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            sidebar_collapsed: false,
        }
    }
}
