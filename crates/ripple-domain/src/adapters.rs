//! Adapters from raw backend rows to canonical entities.
//!
//! Each adapter deserializes the row, then resolves auxiliary lookups:
//! author identity through [`ProfileLookup`], like/comment ownership
//! through the identity provider. A failed profile lookup degrades to a
//! placeholder author and is logged; it never fails the adapter. A row
//! that does not deserialize is a malformed change and does fail.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use ripple_core::change::parse_commit_timestamp;
use ripple_core::{EntityId, IdentityProvider, SyncError, UserId};

use crate::entities::{Author, Comment, Like, Notification, Post};

// ─────────────────────────────────────────────────────────────────────────────
// ProfileLookup
// ─────────────────────────────────────────────────────────────────────────────

/// Source of author identities.
pub trait ProfileLookup: Send + Sync {
    /// Resolve the profile for `user`.
    fn profile(&self, user: &UserId) -> Result<Author, SyncError>;
}

/// An in-memory [`ProfileLookup`] seeded with known profiles.
#[derive(Default)]
pub struct StaticProfiles {
    profiles: RwLock<HashMap<UserId, Author>>,
}

impl StaticProfiles {
    /// Empty lookup; every resolution fails until profiles are added.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add or replace a profile.
    pub fn insert(&self, author: Author) {
        let _ = self.profiles.write().insert(author.id.clone(), author);
    }
}

impl ProfileLookup for StaticProfiles {
    fn profile(&self, user: &UserId) -> Result<Author, SyncError> {
        self.profiles
            .read()
            .get(user)
            .cloned()
            .ok_or_else(|| SyncError::adapter_lookup(format!("profile {user}"), "not found"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire rows
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PostRow {
    id: String,
    author_id: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    comment_count: u64,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Deserialize)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    kind: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    read: bool,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Deserialize)]
struct LikeRow {
    id: String,
    post_id: String,
    user_id: String,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Deserialize)]
struct CommentRow {
    id: String,
    post_id: String,
    author_id: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    created_at: Option<String>,
}

fn created_at_ms(raw: Option<&str>) -> i64 {
    raw.and_then(parse_commit_timestamp).unwrap_or(0)
}

fn parse_row<'a, R: Deserialize<'a>>(table: &str, row: &'a Value) -> Result<R, SyncError> {
    R::deserialize(row).map_err(|err| SyncError::malformed_change(table, err.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapters
// ─────────────────────────────────────────────────────────────────────────────

/// Adapts `posts` rows, resolving the author profile.
pub struct PostAdapter {
    profiles: Arc<dyn ProfileLookup>,
}

impl PostAdapter {
    /// Adapter resolving authors through `profiles`.
    #[must_use]
    pub fn new(profiles: Arc<dyn ProfileLookup>) -> Self {
        Self { profiles }
    }

    /// Convert a raw `posts` row into a [`Post`].
    ///
    /// `liked_by_me` starts false; it is derived from like events by the
    /// aggregator, not from the post row.
    pub fn adapt(&self, row: &Value) -> Result<Post, SyncError> {
        let row: PostRow = parse_row("posts", row)?;
        let author_id = UserId::from(row.author_id);
        let author = resolve_author(self.profiles.as_ref(), author_id);
        Ok(Post {
            id: EntityId::from(row.id),
            author,
            body: row.body,
            like_count: row.like_count,
            comment_count: row.comment_count,
            created_at_ms: created_at_ms(row.created_at.as_deref()),
            liked_by_me: false,
        })
    }
}

/// Adapts `notifications` rows.
pub struct NotificationAdapter;

impl NotificationAdapter {
    /// Convert a raw `notifications` row into a [`Notification`].
    pub fn adapt(&self, row: &Value) -> Result<Notification, SyncError> {
        let row: NotificationRow = parse_row("notifications", row)?;
        Ok(Notification {
            id: EntityId::from(row.id),
            recipient: UserId::from(row.recipient_id),
            kind: row.kind,
            body: row.body,
            read: row.read,
            created_at_ms: created_at_ms(row.created_at.as_deref()),
        })
    }
}

/// Adapts `likes` rows, deriving ownership from the session identity.
pub struct LikeAdapter {
    identity: Arc<dyn IdentityProvider>,
}

impl LikeAdapter {
    /// Adapter deriving `by_me` from `identity`.
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }

    /// Convert a raw `likes` row into a [`Like`].
    pub fn adapt(&self, row: &Value) -> Result<Like, SyncError> {
        let row: LikeRow = parse_row("likes", row)?;
        let user = UserId::from(row.user_id);
        let by_me = self.identity.current_user_id() == Some(user.clone());
        Ok(Like {
            id: EntityId::from(row.id),
            post_id: EntityId::from(row.post_id),
            user,
            by_me,
            created_at_ms: created_at_ms(row.created_at.as_deref()),
        })
    }
}

/// Adapts `comments` rows, resolving the author profile and ownership.
pub struct CommentAdapter {
    profiles: Arc<dyn ProfileLookup>,
    identity: Arc<dyn IdentityProvider>,
}

impl CommentAdapter {
    /// Adapter resolving authors through `profiles`.
    #[must_use]
    pub fn new(profiles: Arc<dyn ProfileLookup>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { profiles, identity }
    }

    /// Convert a raw `comments` row into a [`Comment`].
    pub fn adapt(&self, row: &Value) -> Result<Comment, SyncError> {
        let row: CommentRow = parse_row("comments", row)?;
        let author_id = UserId::from(row.author_id);
        let mine = self.identity.current_user_id() == Some(author_id.clone());
        let author = resolve_author(self.profiles.as_ref(), author_id);
        Ok(Comment {
            id: EntityId::from(row.id),
            post_id: EntityId::from(row.post_id),
            author,
            body: row.body,
            mine,
            created_at_ms: created_at_ms(row.created_at.as_deref()),
        })
    }
}

/// Resolve an author, degrading to a placeholder on lookup failure.
fn resolve_author(profiles: &dyn ProfileLookup, author_id: UserId) -> Author {
    match profiles.profile(&author_id) {
        Ok(author) => author,
        Err(err) => {
            warn!(author = %author_id, %err, "profile lookup failed; using placeholder");
            Author::placeholder(author_id)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
