//! Conflict resolution strategy selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Policy choosing which of several concurrently arriving updates for the
/// same entity takes effect. Configurable per consumer; the engine in
/// `ripple-cache` implements the semantics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Always apply; last write wins.
    #[default]
    Latest,
    /// The local user's own changes apply unconditionally; remote changes
    /// yield to outstanding local optimistic mutations.
    UserWins,
    /// Timestamp-ordered: stale changes drop, near-simultaneous changes are
    /// deferred into the pending queue until they settle.
    Merge,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::UserWins => write!(f, "user-wins"),
            Self::Merge => write!(f, "merge"),
        }
    }
}
