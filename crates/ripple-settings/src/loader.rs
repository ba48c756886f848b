//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RippleSettings::default()`]
//! 2. If `~/.ripple/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `RIPPLE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use ripple_core::ConflictStrategy;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RippleSettings;

/// Resolve the path to the settings file (`~/.ripple/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".ripple").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RippleSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<RippleSettings> {
    let defaults = serde_json::to_value(RippleSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RippleSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut RippleSettings) {
    // ── Realtime settings ───────────────────────────────────────────
    if let Some(v) = read_env_bool("RIPPLE_REALTIME_ENABLED") {
        settings.realtime.enabled = v;
    }
    if let Some(v) = read_env_bool("RIPPLE_AUTO_RECONNECT") {
        settings.realtime.auto_reconnect = v;
    }
    if let Some(v) = read_env_u32("RIPPLE_MAX_RECONNECT_ATTEMPTS", 0, 100) {
        settings.realtime.max_reconnect_attempts = v;
    }
    if let Some(v) = read_env_u64("RIPPLE_RECONNECT_DELAY_MS", 1, 600_000) {
        settings.realtime.initial_reconnect_delay_ms = v;
    }
    if let Some(v) = read_env_u64("RIPPLE_JOIN_TIMEOUT_MS", 100, 600_000) {
        settings.realtime.join_timeout_ms = v;
    }

    // ── Cache settings ──────────────────────────────────────────────
    if let Some(v) = std::env::var("RIPPLE_CONFLICT_STRATEGY").ok().and_then(|s| parse_strategy(&s))
    {
        settings.cache.strategy = v;
    }
    if let Some(v) = read_env_u64("RIPPLE_SETTLE_WINDOW_MS", 0, 60_000) {
        settings.cache.settle_window_ms = v;
    }
    if let Some(v) = read_env_u64("RIPPLE_PENDING_TTL_MS", 100, 3_600_000) {
        settings.cache.pending_ttl_ms = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a conflict strategy by its wire name.
pub fn parse_strategy(val: &str) -> Option<ConflictStrategy> {
    match val.to_ascii_lowercase().as_str() {
        "latest" => Some(ConflictStrategy::Latest),
        "user-wins" => Some(ConflictStrategy::UserWins),
        "merge" => Some(ConflictStrategy::Merge),
        _ => None,
    }
}

/// Parse a `u32` within an inclusive range.
pub fn parse_u32_in_range(val: &str, min: u32, max: u32) -> Option<u32> {
    val.parse::<u32>().ok().filter(|v| (min..=max).contains(v))
}

/// Parse a `u64` within an inclusive range.
pub fn parse_u64_in_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.parse::<u64>().ok().filter(|v| (min..=max).contains(v))
}

fn read_env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_bool(&v))
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_u32_in_range(&v, min, max))
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_u64_in_range(&v, min, max))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- deep_merge --

    #[test]
    fn merge_overrides_scalars() {
        let merged = deep_merge(json!({"a": 1, "b": 2}), json!({"b": 3}));
        assert_eq!(merged, json!({"a": 1, "b": 3}));
    }

    #[test]
    fn merge_recurses_into_objects() {
        let merged = deep_merge(
            json!({"realtime": {"enabled": true, "joinTimeoutMs": 10_000}}),
            json!({"realtime": {"enabled": false}}),
        );
        assert_eq!(
            merged,
            json!({"realtime": {"enabled": false, "joinTimeoutMs": 10_000}})
        );
    }

    #[test]
    fn merge_skips_nulls() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null, "b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_replaces_arrays() {
        let merged = deep_merge(json!({"a": [1, 2, 3]}), json!({"a": [9]}));
        assert_eq!(merged, json!({"a": [9]}));
    }

    #[test]
    fn merge_adds_new_keys() {
        let merged = deep_merge(json!({}), json!({"x": {"y": 1}}));
        assert_eq!(merged, json!({"x": {"y": 1}}));
    }

    // -- pure parsers --

    #[test]
    fn parse_bool_accepts_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "FALSE", "0", "no", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_strategy_names() {
        assert_eq!(parse_strategy("latest"), Some(ConflictStrategy::Latest));
        assert_eq!(parse_strategy("USER-WINS"), Some(ConflictStrategy::UserWins));
        assert_eq!(parse_strategy("merge"), Some(ConflictStrategy::Merge));
        assert_eq!(parse_strategy("newest"), None);
    }

    #[test]
    fn parse_ints_respect_range() {
        assert_eq!(parse_u32_in_range("5", 0, 100), Some(5));
        assert_eq!(parse_u32_in_range("101", 0, 100), None);
        assert_eq!(parse_u64_in_range("100", 1, 600_000), Some(100));
        assert_eq!(parse_u64_in_range("0", 1, 600_000), None);
        assert_eq!(parse_u64_in_range("abc", 1, 600_000), None);
        assert_eq!(parse_u64_in_range("-1", 1, 600_000), None);
    }

    // -- file loading --

    #[test]
    fn missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, RippleSettings::default());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"realtime": {"maxReconnectAttempts": 3}, "cache": {"strategy": "merge"}}"#,
        )
        .unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.realtime.max_reconnect_attempts, 3);
        assert_eq!(settings.cache.strategy, ConflictStrategy::Merge);
        // Untouched fields keep defaults
        assert!(settings.realtime.enabled);
        assert_eq!(settings.cache.settle_window_ms, 1000);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn null_fields_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"realtime": {"enabled": null}}"#).unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert!(settings.realtime.enabled);
    }
}
