//! Canonical cache entities for the social feed domain.
//!
//! These are the shapes the UI reads: backend rows enriched with author
//! identity and client-only derived flags (`liked_by_me`, `mine`, unread
//! state) that never exist on the wire.

use serde::{Deserialize, Serialize};

use ripple_cache::CacheEntity;
use ripple_core::{EntityId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Author
// ─────────────────────────────────────────────────────────────────────────────

/// Resolved author identity attached to posts and comments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// The author's user id.
    pub id: UserId,
    /// Display name shown in the UI.
    pub display_name: String,
    /// Avatar image URL, if the profile has one.
    pub avatar_url: Option<String>,
}

impl Author {
    /// Placeholder shown when the profile lookup fails; carries the real
    /// id so a later lookup can replace it.
    #[must_use]
    pub fn placeholder(id: UserId) -> Self {
        Self {
            id,
            display_name: "Unknown".to_owned(),
            avatar_url: None,
        }
    }

    /// Whether this author is the lookup-failure placeholder.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.display_name == "Unknown" && self.avatar_url.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Post
// ─────────────────────────────────────────────────────────────────────────────

/// A feed post with derived aggregate counts and like state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Row id.
    pub id: EntityId,
    /// Resolved author (placeholder on lookup failure).
    pub author: Author,
    /// Post body text.
    pub body: String,
    /// Like count, kept current by the like aggregator.
    pub like_count: u64,
    /// Comment count, kept current by the comment aggregator.
    pub comment_count: u64,
    /// Creation time in epoch milliseconds.
    pub created_at_ms: i64,
    /// Whether the local user has liked this post. Client-only.
    pub liked_by_me: bool,
}

impl CacheEntity for Post {
    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notification
// ─────────────────────────────────────────────────────────────────────────────

/// An in-app notification row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Row id.
    pub id: EntityId,
    /// The user the notification is addressed to.
    pub recipient: UserId,
    /// Notification kind (`like`, `comment`, `follow`, ...).
    pub kind: String,
    /// Rendered notification text.
    pub body: String,
    /// Whether the user has seen it.
    pub read: bool,
    /// Creation time in epoch milliseconds.
    pub created_at_ms: i64,
}

impl CacheEntity for Notification {
    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Like
// ─────────────────────────────────────────────────────────────────────────────

/// One user's like on a post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    /// Row id.
    pub id: EntityId,
    /// The liked post.
    pub post_id: EntityId,
    /// The liking user.
    pub user: UserId,
    /// Whether the liking user is the local user. Client-only.
    pub by_me: bool,
    /// Creation time in epoch milliseconds.
    pub created_at_ms: i64,
}

impl CacheEntity for Like {
    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Comment
// ─────────────────────────────────────────────────────────────────────────────

/// A comment on a post.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Row id.
    pub id: EntityId,
    /// The commented post.
    pub post_id: EntityId,
    /// Resolved author (placeholder on lookup failure).
    pub author: Author,
    /// Comment body text.
    pub body: String,
    /// Whether the local user wrote it. Client-only.
    pub mine: bool,
    /// Creation time in epoch milliseconds.
    pub created_at_ms: i64,
}

impl CacheEntity for Comment {
    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }
}
