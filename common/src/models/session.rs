// common/src/models/session.rs
use serde::{Deserialize, Serialize};

use super::user::User;

/// Persisted authentication state for the client.
///
/// `is_authenticated` is derived but stored: it is true only when both
/// `user` and `token` are present and the token passed validation at the
/// last check. `is_loading` and `last_error` are transient UI state and
/// are not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_authenticated: bool,
    #[serde(skip)]
    pub is_loading: bool,
    #[serde(skip)]
    pub last_error: Option<String>,
}

impl SessionRecord {
    /// Empty, unauthenticated record
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the record holds both an identity and a credential
    pub fn is_complete(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }
}
