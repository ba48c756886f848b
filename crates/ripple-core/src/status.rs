//! Connection state machine states and the exposed status snapshot.
//!
//! [`ConnectionState`] is the internal machine state; [`ConnectionStatus`]
//! is the read-only snapshot consumers observe. Completion of subscribe /
//! reconnect operations is observed through status transitions, never
//! through return values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionState
// ─────────────────────────────────────────────────────────────────────────────

/// State of one channel's connection lifecycle.
///
/// Legal transitions:
/// `Idle → Connecting → Connected → {Closed | Erroring}`,
/// `Erroring → Reconnecting → Connecting` (bounded loop),
/// terminal `Erroring` once the attempt budget is exhausted, exited only by
/// an explicit `reconnect()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never subscribed (or realtime disabled).
    #[default]
    Idle,
    /// Subscribe sent, waiting for the ack.
    Connecting,
    /// Subscribed and receiving changes.
    Connected,
    /// A channel error or timeout occurred.
    Erroring,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
    /// Explicitly unsubscribed.
    Closed,
}

impl ConnectionState {
    /// Whether the channel is live.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Whether a subscribe attempt is in flight or pending.
    #[must_use]
    pub fn is_connecting(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Erroring => write!(f, "erroring"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionStatus
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of a channel's connection status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Current machine state.
    pub state: ConnectionState,
    /// Whether the channel is live.
    pub is_connected: bool,
    /// Whether a subscribe attempt is in flight or pending.
    pub is_connecting: bool,
    /// Last surfaced error message, if any.
    pub error: Option<String>,
    /// Reconnect attempts consumed since the last reset.
    pub reconnect_attempts: u32,
    /// When the channel last reached `Connected`.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// When the channel last left `Connected`.
    pub last_disconnected_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }

    #[test]
    fn connected_predicate() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Erroring.is_connected());
    }

    #[test]
    fn connecting_covers_reconnecting() {
        assert!(ConnectionState::Connecting.is_connecting());
        assert!(ConnectionState::Reconnecting.is_connecting());
        assert!(!ConnectionState::Connected.is_connecting());
        assert!(!ConnectionState::Closed.is_connecting());
    }

    #[test]
    fn display_names() {
        assert_eq!(ConnectionState::Idle.to_string(), "idle");
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn status_default_is_empty() {
        let status = ConnectionStatus::default();
        assert_eq!(status.state, ConnectionState::Idle);
        assert!(!status.is_connected);
        assert!(status.error.is_none());
        assert_eq!(status.reconnect_attempts, 0);
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = ConnectionStatus {
            state: ConnectionState::Connected,
            is_connected: true,
            ..ConnectionStatus::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isConnected"], true);
        assert_eq!(json["state"], "connected");
        assert!(json["reconnectAttempts"].is_number());
    }
}
