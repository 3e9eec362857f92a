// common/src/models/user.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated identity as returned by the authentication exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub email: String,
    /// Role names, e.g. "USER", "ADMIN"
    pub roles: Vec<String>,
    pub avatar_url: Option<String>,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
