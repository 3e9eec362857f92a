// common/src/models/comment.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A comment as returned by the comment-creation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author: String,
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
}

/// A comment drafted while unauthenticated, stashed for replay after login.
/// Exactly one of these exists at a time; new drafts overwrite old ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingComment {
    pub post_id: Uuid,
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl PendingComment {
    pub fn new(post_id: Uuid, content: String, parent_comment_id: Option<Uuid>) -> Self {
        Self {
            post_id,
            content,
            parent_comment_id,
            created_at: Utc::now(),
        }
    }

    pub fn payload(&self) -> NewComment {
        NewComment {
            content: self.content.clone(),
            parent_comment_id: self.parent_comment_id,
        }
    }
}
