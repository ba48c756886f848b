//! Settings types with compiled defaults.
//!
//! Every field carries a `serde(default)` so a partial settings file only
//! overrides what it names; the loader deep-merges the rest from defaults.

use ripple_core::ConflictStrategy;
use ripple_core::backoff::{
    DEFAULT_INITIAL_DELAY_MS, DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS,
};
use serde::{Deserialize, Serialize};

/// Default settle window for the merge strategy in milliseconds.
pub const DEFAULT_SETTLE_WINDOW_MS: u64 = 1000;
/// Default lifetime of a deferred pending update in milliseconds.
pub const DEFAULT_PENDING_TTL_MS: u64 = 30_000;

// ─────────────────────────────────────────────────────────────────────────────
// Top level
// ─────────────────────────────────────────────────────────────────────────────

/// Root settings for the sync engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RippleSettings {
    /// Realtime connection settings.
    #[serde(default)]
    pub realtime: RealtimeSettings,
    /// Cache / conflict resolution settings.
    #[serde(default)]
    pub cache: CacheSettings,
}

// ─────────────────────────────────────────────────────────────────────────────
// Realtime
// ─────────────────────────────────────────────────────────────────────────────

/// Connection lifecycle and reconnect settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeSettings {
    /// Master toggle; when off, `subscribe()` is a logged no-op.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether channel errors schedule automatic reconnects.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Reconnect attempt budget before terminal erroring.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Initial backoff delay in ms; doubles per attempt.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_reconnect_delay_ms: u64,
    /// How long a subscribe may stay unacked before it counts as failed.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}
fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}
fn default_join_timeout_ms() -> u64 {
    DEFAULT_JOIN_TIMEOUT_MS
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            initial_reconnect_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Conflict resolution and pending queue settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettings {
    /// Conflict resolution strategy.
    #[serde(default)]
    pub strategy: ConflictStrategy,
    /// Settle window for the merge strategy in ms.
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,
    /// Lifetime of a deferred pending update in ms.
    #[serde(default = "default_pending_ttl_ms")]
    pub pending_ttl_ms: u64,
}

fn default_settle_window_ms() -> u64 {
    DEFAULT_SETTLE_WINDOW_MS
}
fn default_pending_ttl_ms() -> u64 {
    DEFAULT_PENDING_TTL_MS
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            strategy: ConflictStrategy::default(),
            settle_window_ms: DEFAULT_SETTLE_WINDOW_MS,
            pending_ttl_ms: DEFAULT_PENDING_TTL_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = RippleSettings::default();
        assert!(settings.realtime.enabled);
        assert!(settings.realtime.auto_reconnect);
        assert_eq!(settings.realtime.max_reconnect_attempts, 5);
        assert_eq!(settings.realtime.initial_reconnect_delay_ms, 1000);
        assert_eq!(settings.realtime.join_timeout_ms, 10_000);
        assert_eq!(settings.cache.strategy, ConflictStrategy::Latest);
        assert_eq!(settings.cache.settle_window_ms, 1000);
        assert_eq!(settings.cache.pending_ttl_ms, 30_000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: RippleSettings =
            serde_json::from_str(r#"{"realtime": {"maxReconnectAttempts": 2}}"#).unwrap();
        assert_eq!(settings.realtime.max_reconnect_attempts, 2);
        assert!(settings.realtime.enabled);
        assert_eq!(settings.cache.settle_window_ms, 1000);
    }

    #[test]
    fn empty_json_is_defaults() {
        let settings: RippleSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, RippleSettings::default());
    }

    #[test]
    fn strategy_from_wire_name() {
        let settings: RippleSettings =
            serde_json::from_str(r#"{"cache": {"strategy": "user-wins"}}"#).unwrap();
        assert_eq!(settings.cache.strategy, ConflictStrategy::UserWins);
    }

    #[test]
    fn serde_roundtrip() {
        let settings = RippleSettings {
            realtime: RealtimeSettings {
                enabled: false,
                auto_reconnect: false,
                max_reconnect_attempts: 9,
                initial_reconnect_delay_ms: 250,
                join_timeout_ms: 5000,
            },
            cache: CacheSettings {
                strategy: ConflictStrategy::Merge,
                settle_window_ms: 500,
                pending_ttl_ms: 60_000,
            },
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: RippleSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
