//! Bookkeeping the conflict resolver leans on.
//!
//! [`LastAppliedLedger`] remembers, per entity, the timestamp of the last
//! change that made it into the cache (remote or local optimistic).
//! [`OptimisticLedger`] counts outstanding optimistic mutations per
//! entity; the user-wins strategy defers remote changes while one is in
//! flight. [`PendingUpdateQueue`] parks changes the merge and user-wins
//! strategies deferred; at most one per entity, newest timestamp kept,
//! discarded after a TTL.
//!
//! Both take explicit `now_ms` arguments so tests control the clock.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use ripple_core::{ChangeEvent, EntityId};

// ─────────────────────────────────────────────────────────────────────────────
// LastAppliedLedger
// ─────────────────────────────────────────────────────────────────────────────

/// Per-entity timestamp of the last applied change.
#[derive(Default)]
pub struct LastAppliedLedger {
    entries: Mutex<HashMap<EntityId, i64>>,
}

impl LastAppliedLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last applied timestamp for `id`, if any change was applied.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<i64> {
        self.entries.lock().get(id).copied()
    }

    /// Record `timestamp_ms` as the last applied change for `id`.
    ///
    /// Overwrites unconditionally; the strategy decides what gets applied,
    /// the ledger only remembers it.
    pub fn record(&self, id: &EntityId, timestamp_ms: i64) {
        let _ = self.entries.lock().insert(id.clone(), timestamp_ms);
    }

    /// Forget `id` (e.g. after its row was deleted).
    pub fn forget(&self, id: &EntityId) {
        let _ = self.entries.lock().remove(id);
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entity is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OptimisticLedger
// ─────────────────────────────────────────────────────────────────────────────

/// Outstanding optimistic mutations, counted per entity.
///
/// Shared between the mutator (which begins and ends entries) and the
/// resolver (whose user-wins strategy consults them).
#[derive(Default)]
pub struct OptimisticLedger {
    counts: Mutex<HashMap<EntityId, u32>>,
}

impl OptimisticLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one optimistic mutation of `id` as in flight.
    pub fn begin(&self, id: &EntityId) {
        *self.counts.lock().entry(id.clone()).or_insert(0) += 1;
    }

    /// Mark one optimistic mutation of `id` as settled (committed or
    /// rolled back).
    pub fn end(&self, id: &EntityId) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                let _ = counts.remove(id);
            }
        }
    }

    /// Whether any optimistic mutation of `id` is still in flight.
    #[must_use]
    pub fn is_outstanding(&self, id: &EntityId) -> bool {
        self.counts.lock().contains_key(id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PendingUpdateQueue
// ─────────────────────────────────────────────────────────────────────────────

struct PendingEntry {
    event: ChangeEvent,
    enqueued_ms: i64,
}

/// Deferred changes awaiting a settle window, at most one per entity.
pub struct PendingUpdateQueue {
    ttl_ms: i64,
    entries: Mutex<HashMap<EntityId, PendingEntry>>,
}

impl PendingUpdateQueue {
    /// Queue whose entries expire `ttl_ms` after being deferred.
    #[must_use]
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms: i64::try_from(ttl_ms).unwrap_or(i64::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Park `event` for `id`.
    ///
    /// When an entry already exists the one with the later change
    /// timestamp is kept; the enqueue time restarts either way.
    pub fn defer(&self, id: EntityId, event: ChangeEvent, now_ms: i64) {
        let mut entries = self.entries.lock();
        let keep_existing = entries
            .get(&id)
            .is_some_and(|entry| entry.event.timestamp_ms > event.timestamp_ms);
        if keep_existing {
            debug!(%id, timestamp_ms = event.timestamp_ms, "deferred change superseded by queued one");
            if let Some(entry) = entries.get_mut(&id) {
                entry.enqueued_ms = now_ms;
            }
            return;
        }
        let _ = entries.insert(
            id,
            PendingEntry {
                event,
                enqueued_ms: now_ms,
            },
        );
    }

    /// Remove and return the entry for `id` if it has not expired.
    ///
    /// An expired entry is discarded and logged; either way nothing for
    /// `id` remains queued afterwards.
    #[must_use]
    pub fn take_fresh(&self, id: &EntityId, now_ms: i64) -> Option<ChangeEvent> {
        let entry = self.entries.lock().remove(id)?;
        if now_ms.saturating_sub(entry.enqueued_ms) > self.ttl_ms {
            debug!(%id, timestamp_ms = entry.event.timestamp_ms, "deferred change expired");
            return None;
        }
        Some(entry.event)
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self, now_ms: i64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now_ms.saturating_sub(entry.enqueued_ms) <= self.ttl_ms);
        before - entries.len()
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
