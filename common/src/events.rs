// common/src/events.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broker event published when a post goes live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostNotification {
    pub post_id: Uuid,
    pub title: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
}

/// Broker event published when a comment lands on a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNotification {
    pub post_id: Uuid,
    pub comment_id: Uuid,
    pub author: String,
    pub excerpt: String,
}

/// Topic carrying new-post notifications
pub const POSTS_TOPIC: &str = "/topic/posts";

/// Topic carrying comment notifications for a single post
pub fn comments_topic(post_id: &Uuid) -> String {
    format!("/topic/posts/{}/comments", post_id)
}

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Human-readable message surfaced to the user, e.g. before a forced
/// logout redirect. Cosmetic duplication is tolerable; these carry no state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}
