//! Row-change events delivered by the backend change feed.
//!
//! The feed delivers [`RawChange`] payloads: base fields at the top level
//! and the old/new rows as opaque [`serde_json::Value`], matching the wire
//! format exactly. The action arrives as a string tag so that unknown tags
//! can be dropped at the routing layer instead of failing deserialization.
//!
//! [`ChangeEvent`] is the validated, typed form that flows through the
//! resolver and cache layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SyncError;
use crate::ids::{EntityId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// ChangeAction
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of row change, mirroring the feed's event tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

impl ChangeAction {
    /// Parse a wire action tag. Returns `None` for unknown tags so callers
    /// can drop them non-fatally.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    /// The wire tag for this action.
    #[must_use]
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RawChange (wire payload)
// ─────────────────────────────────────────────────────────────────────────────

/// A change payload exactly as delivered by the feed.
///
/// `event_type` is kept as a raw string: the routing layer parses it and
/// drops unknown tags with a warning rather than rejecting the message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChange {
    /// Backend table the row belongs to.
    pub table: String,
    /// Postgres schema of the table.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Action tag (`INSERT` / `UPDATE` / `DELETE`, or unknown).
    pub event_type: String,
    /// Row state before the change (updates and deletes).
    #[serde(default)]
    pub old: Option<Value>,
    /// Row state after the change (inserts and updates).
    #[serde(default)]
    pub new: Option<Value>,
    /// Commit timestamp, RFC 3339.
    pub commit_timestamp: String,
    /// User whose action originated the change, when the backend knows it.
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_schema() -> String {
    "public".to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// ChangeEvent (validated form)
// ─────────────────────────────────────────────────────────────────────────────

/// A validated row-change event.
///
/// Produced from [`RawChange`] by [`ChangeEvent::from_raw`]; carries a
/// millisecond timestamp used by timestamp-ordered conflict strategies.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    /// Backend table the row belongs to.
    pub table: String,
    /// What happened to the row.
    pub action: ChangeAction,
    /// Row state before the change.
    pub old_row: Option<Value>,
    /// Row state after the change.
    pub new_row: Option<Value>,
    /// Commit timestamp in epoch milliseconds.
    pub timestamp_ms: i64,
    /// User whose action originated the change, if known.
    pub originating_user: Option<UserId>,
}

impl ChangeEvent {
    /// Validate a wire payload into a typed event.
    ///
    /// Fails on unknown action tags and unparseable commit timestamps; the
    /// router logs and drops such payloads without surfacing an error to
    /// the channel.
    pub fn from_raw(raw: RawChange) -> Result<Self, SyncError> {
        let action = ChangeAction::from_tag(&raw.event_type).ok_or_else(|| {
            SyncError::malformed_change(&raw.table, format!("unknown action tag {:?}", raw.event_type))
        })?;
        let timestamp_ms = parse_commit_timestamp(&raw.commit_timestamp).ok_or_else(|| {
            SyncError::malformed_change(
                &raw.table,
                format!("unparseable commit timestamp {:?}", raw.commit_timestamp),
            )
        })?;
        Ok(Self {
            table: raw.table,
            action,
            old_row: raw.old,
            new_row: raw.new,
            timestamp_ms,
            originating_user: raw.user_id.map(UserId::from),
        })
    }

    /// The id of the entity this change touches.
    ///
    /// Taken from the new row when present (inserts, updates), otherwise
    /// from the old row (deletes). Numeric ids are stringified.
    #[must_use]
    pub fn entity_id(&self) -> Option<EntityId> {
        row_id(self.new_row.as_ref()).or_else(|| row_id(self.old_row.as_ref()))
    }
}

/// Parse an RFC 3339 commit timestamp into epoch milliseconds.
#[must_use]
pub fn parse_commit_timestamp(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

fn row_id(row: Option<&Value>) -> Option<EntityId> {
    match row?.get("id")? {
        Value::String(s) => Some(EntityId::from(s.as_str())),
        Value::Number(n) => Some(EntityId::from(n.to_string())),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
