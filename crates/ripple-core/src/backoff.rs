//! Exponential backoff math for the reconnect loop.
//!
//! Pure, sync-only building block; the timer execution lives in
//! `ripple-realtime` (which has access to tokio). The delay before retry
//! `N` is `initial_delay × 2^N`, overflow-safe and optionally capped.

use std::time::Duration;

/// Default reconnect attempt budget.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Default initial reconnect delay in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
/// Default join timeout in milliseconds.
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 10_000;

/// Backoff delay in milliseconds before retry `attempt` (zero-based).
///
/// `initial_delay_ms × 2^attempt`, saturating on overflow.
#[must_use]
pub fn reconnect_delay_ms(attempt: u32, initial_delay_ms: u64) -> u64 {
    initial_delay_ms.saturating_mul(1u64 << attempt.min(31))
}

/// [`reconnect_delay_ms`] with an upper bound.
#[must_use]
pub fn reconnect_delay_capped_ms(attempt: u32, initial_delay_ms: u64, max_delay_ms: u64) -> u64 {
    reconnect_delay_ms(attempt, initial_delay_ms).min(max_delay_ms)
}

/// Backoff delay as a [`Duration`].
#[must_use]
pub fn reconnect_delay(attempt: u32, initial_delay_ms: u64) -> Duration {
    Duration::from_millis(reconnect_delay_ms(attempt, initial_delay_ms))
}
