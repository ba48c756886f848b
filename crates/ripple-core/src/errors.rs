//! Error taxonomy for the sync layer.
//!
//! Built on [`thiserror`]:
//!
//! - Transient errors ([`SyncError::Channel`], [`SyncError::TimedOut`]) are
//!   retried per backoff and also surfaced via `on_error`.
//! - [`SyncError::MaxReconnectExceeded`] is terminal: surfaced exactly once,
//!   cleared only by an explicit `reconnect()`.
//! - Informational errors ([`SyncError::FeatureDisabled`],
//!   [`SyncError::AdapterLookup`], [`SyncError::ConflictDrop`],
//!   [`SyncError::MalformedChange`]) never block the surrounding operation.
//!
//! Every variant carries a machine-readable code via [`SyncError::code`] and
//! a severity via [`SyncError::severity`] for logging and retry decisions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::ids::{ChannelId, EntityId};

// ─────────────────────────────────────────────────────────────────────────────
// Severity
// ─────────────────────────────────────────────────────────────────────────────

/// How an error affects the surrounding operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Logged only; the surrounding operation proceeds.
    Info,
    /// Retryable; the reconnect loop handles it.
    Transient,
    /// Failed and will not self-heal, but the manager is still usable.
    Error,
    /// Requires an explicit manual reset.
    Terminal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Transient => write!(f, "transient"),
            Self::Error => write!(f, "error"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SyncError
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type for the sync layer.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SyncError {
    /// The realtime feed client handle was never provided.
    #[error("realtime feed client is not initialized")]
    ClientNotInitialized,

    /// The realtime feature toggle is off; subscribe is a no-op.
    #[error("realtime sync is disabled for channel {channel}")]
    FeatureDisabled {
        /// Channel whose subscribe was skipped.
        channel: ChannelId,
    },

    /// The feed reported a channel error.
    #[error("channel {channel} error: {message}")]
    Channel {
        /// Channel that errored.
        channel: ChannelId,
        /// Feed-reported message.
        message: String,
    },

    /// A subscribe attempt neither acked nor errored within the window.
    #[error("channel {channel} subscribe timed out after {timeout_ms}ms")]
    TimedOut {
        /// Channel that timed out.
        channel: ChannelId,
        /// The join timeout that elapsed.
        timeout_ms: u64,
    },

    /// The reconnect attempt budget is exhausted.
    #[error("Max reconnection attempts exceeded for channel {channel} ({max_attempts} attempts)")]
    MaxReconnectExceeded {
        /// Channel stuck in terminal erroring.
        channel: ChannelId,
        /// The configured attempt budget.
        max_attempts: u32,
    },

    /// A feed payload could not be validated (unknown tag, bad timestamp).
    #[error("malformed change on table {table}: {message}")]
    MalformedChange {
        /// Table the payload named.
        table: String,
        /// What failed to validate.
        message: String,
    },

    /// An adapter's auxiliary lookup failed; the change still applies with
    /// placeholder data.
    #[error("adapter lookup failed for {subject}: {message}")]
    AdapterLookup {
        /// What was being looked up (e.g. `profile u1`).
        subject: String,
        /// Why the lookup failed.
        message: String,
    },

    /// The conflict resolver dropped a change.
    #[error("change for {entity} at {timestamp_ms} dropped: {reason}")]
    ConflictDrop {
        /// Entity the change targeted.
        entity: EntityId,
        /// The dropped change's timestamp.
        timestamp_ms: i64,
        /// Why it was dropped.
        reason: String,
    },

    /// A second manager was registered for an already-owned channel id.
    #[error("channel {channel} already has an active connection manager")]
    DuplicateChannel {
        /// The contested channel id.
        channel: ChannelId,
    },
}

impl SyncError {
    /// Shorthand for [`SyncError::Channel`].
    #[must_use]
    pub fn channel_error(channel: impl Into<ChannelId>, message: impl Into<String>) -> Self {
        Self::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`SyncError::MalformedChange`].
    #[must_use]
    pub fn malformed_change(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedChange {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`SyncError::AdapterLookup`].
    #[must_use]
    pub fn adapter_lookup(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AdapterLookup {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClientNotInitialized => "CLIENT_NOT_INITIALIZED",
            Self::FeatureDisabled { .. } => "FEATURE_DISABLED",
            Self::Channel { .. } => "CHANNEL_ERROR",
            Self::TimedOut { .. } => "TIMED_OUT",
            Self::MaxReconnectExceeded { .. } => "MAX_RECONNECT_EXCEEDED",
            Self::MalformedChange { .. } => "MALFORMED_CHANGE",
            Self::AdapterLookup { .. } => "ADAPTER_LOOKUP_FAILURE",
            Self::ConflictDrop { .. } => "CONFLICT_DROP",
            Self::DuplicateChannel { .. } => "DUPLICATE_CHANNEL",
        }
    }

    /// Severity for logging and retry decisions.
    #[must_use]
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::FeatureDisabled { .. }
            | Self::MalformedChange { .. }
            | Self::AdapterLookup { .. }
            | Self::ConflictDrop { .. } => ErrorSeverity::Info,
            Self::Channel { .. } | Self::TimedOut { .. } => ErrorSeverity::Transient,
            Self::ClientNotInitialized | Self::DuplicateChannel { .. } => ErrorSeverity::Error,
            Self::MaxReconnectExceeded { .. } => ErrorSeverity::Terminal,
        }
    }

    /// Whether the reconnect loop should retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.severity() == ErrorSeverity::Transient
    }

    /// Whether this error requires an explicit `reconnect()` to clear.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.severity() == ErrorSeverity::Terminal
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_error_is_transient() {
        let err = SyncError::channel_error("posts", "socket reset");
        assert_eq!(err.severity(), ErrorSeverity::Transient);
        assert!(err.is_retryable());
        assert!(!err.is_terminal());
        assert_eq!(err.code(), "CHANNEL_ERROR");
    }

    #[test]
    fn timeout_is_transient() {
        let err = SyncError::TimedOut {
            channel: "posts".into(),
            timeout_ms: 10_000,
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("10000ms"));
    }

    #[test]
    fn max_reconnect_is_terminal() {
        let err = SyncError::MaxReconnectExceeded {
            channel: "posts".into(),
            max_attempts: 5,
        };
        assert!(err.is_terminal());
        assert!(!err.is_retryable());
        // Consumers match on this phrase when showing a manual-retry UI.
        assert!(err.to_string().contains("Max reconnection attempts"));
    }

    #[test]
    fn client_not_initialized_is_not_retryable() {
        let err = SyncError::ClientNotInitialized;
        assert_eq!(err.severity(), ErrorSeverity::Error);
        assert!(!err.is_retryable());
    }

    #[test]
    fn informational_errors() {
        let errs = [
            SyncError::FeatureDisabled {
                channel: "posts".into(),
            },
            SyncError::malformed_change("posts", "unknown action tag"),
            SyncError::adapter_lookup("profile u1", "not found"),
            SyncError::ConflictDrop {
                entity: "p1".into(),
                timestamp_ms: 100,
                reason: "stale".into(),
            },
        ];
        for err in errs {
            assert_eq!(err.severity(), ErrorSeverity::Info, "{err}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn duplicate_channel_names_channel() {
        let err = SyncError::DuplicateChannel {
            channel: "likes".into(),
        };
        assert!(err.to_string().contains("likes"));
        assert_eq!(err.code(), "DUPLICATE_CHANNEL");
    }

    #[test]
    fn codes_are_distinct() {
        let codes = [
            SyncError::ClientNotInitialized.code(),
            SyncError::channel_error("c", "m").code(),
            SyncError::malformed_change("t", "m").code(),
            SyncError::adapter_lookup("s", "m").code(),
        ];
        let mut unique = codes.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn severity_display() {
        assert_eq!(ErrorSeverity::Transient.to_string(), "transient");
        assert_eq!(ErrorSeverity::Terminal.to_string(), "terminal");
    }

    #[test]
    fn sync_error_is_std_error() {
        let err = SyncError::ClientNotInitialized;
        let _: &dyn std::error::Error = &err;
    }
}
