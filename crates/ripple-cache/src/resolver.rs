//! Timestamp-ordered conflict resolution for incoming changes.
//!
//! Every validated change passes through [`ConflictResolver::resolve`]
//! before it touches the cache. The resolver is idempotent: replaying an
//! already-applied (entity, timestamp) pair resolves to a drop under
//! every strategy.
//!
//! Strategies:
//!
//! - `latest`: always apply; the feed is authoritative and the last write
//!   wins even when its commit timestamp is older.
//! - `user-wins`: the local user's own changes always apply; changes from
//!   other users are parked in the [`PendingUpdateQueue`] while a local
//!   optimistic mutation of the same entity is outstanding, and drain once
//!   the next foreign change for that entity arrives after it settles.
//! - `merge`: apply only changes strictly newer than the entity's last
//!   applied timestamp; a change landing within the settle window of it
//!   is parked in the [`PendingUpdateQueue`] and contends with the next
//!   change for the same entity, later timestamp winning.
//!
//! Deferred changes are drained on the next event for the same entity;
//! there is no timer-based flush, so a deferred change with no successor
//! expires after the pending TTL.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use ripple_core::{ChangeEvent, ConflictStrategy, EntityId, IdentityProvider};
use ripple_settings::CacheSettings;

use crate::ledger::{LastAppliedLedger, OptimisticLedger, PendingUpdateQueue};

/// What the resolver decided for one incoming change.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// Apply this event to the cache. Under merge this may be a
    /// previously deferred event that won over the incoming one.
    Apply(ChangeEvent),
    /// The event was parked in the pending queue.
    Defer,
    /// The event was discarded.
    Drop {
        /// Why the event was discarded.
        reason: String,
    },
}

/// Per-channel conflict resolver.
pub struct ConflictResolver {
    strategy: ConflictStrategy,
    settle_window_ms: i64,
    identity: Arc<dyn IdentityProvider>,
    last_applied: LastAppliedLedger,
    optimistic: Arc<OptimisticLedger>,
    pending: PendingUpdateQueue,
}

impl ConflictResolver {
    /// Resolver with explicit strategy and windows.
    #[must_use]
    pub fn new(
        strategy: ConflictStrategy,
        settle_window_ms: u64,
        pending_ttl_ms: u64,
        identity: Arc<dyn IdentityProvider>,
        optimistic: Arc<OptimisticLedger>,
    ) -> Self {
        Self {
            strategy,
            settle_window_ms: i64::try_from(settle_window_ms).unwrap_or(i64::MAX),
            identity,
            last_applied: LastAppliedLedger::new(),
            optimistic,
            pending: PendingUpdateQueue::new(pending_ttl_ms),
        }
    }

    /// Resolver configured from loaded settings.
    #[must_use]
    pub fn from_settings(
        settings: &CacheSettings,
        identity: Arc<dyn IdentityProvider>,
        optimistic: Arc<OptimisticLedger>,
    ) -> Self {
        Self::new(
            settings.strategy,
            settings.settle_window_ms,
            settings.pending_ttl_ms,
            identity,
            optimistic,
        )
    }

    /// The strategy this resolver applies.
    #[must_use]
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Decide what to do with `event`.
    ///
    /// On [`Resolution::Apply`] the returned event's timestamp is already
    /// recorded as the entity's last applied; the caller only mutates the
    /// cache.
    #[must_use]
    pub fn resolve(&self, event: ChangeEvent) -> Resolution {
        let Some(id) = event.entity_id() else {
            return self.drop_event(&event, "change carries no entity id");
        };
        let last = self.last_applied.get(&id);
        if last == Some(event.timestamp_ms) {
            return self.drop_event(&event, "already applied at this timestamp");
        }
        match self.strategy {
            ConflictStrategy::Latest => self.apply(&id, event),
            ConflictStrategy::UserWins => self.resolve_user_wins(&id, event),
            ConflictStrategy::Merge => self.resolve_merge(&id, last, event),
        }
    }

    /// Record a local write (e.g. a committed optimistic mutation) so the
    /// echo of it coming back over the feed resolves as already applied.
    pub fn record_local_write(&self, id: &EntityId, timestamp_ms: i64) {
        self.last_applied.record(id, timestamp_ms);
    }

    /// The last applied timestamp for `id`.
    #[must_use]
    pub fn last_applied(&self, id: &EntityId) -> Option<i64> {
        self.last_applied.get(id)
    }

    /// Number of deferred changes currently parked.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop expired deferred changes. Returns how many were dropped.
    pub fn purge_expired_pending(&self) -> usize {
        self.pending.purge_expired(now_ms())
    }

    fn resolve_user_wins(&self, id: &EntityId, event: ChangeEvent) -> Resolution {
        let own = match (&event.originating_user, self.identity.current_user_id()) {
            (Some(originating), Some(current)) => *originating == current,
            _ => false,
        };
        if own {
            // Own changes are never superseded by a parked foreign one.
            return self.apply(id, event);
        }
        if self.optimistic.is_outstanding(id) {
            self.pending.defer(id.clone(), event, now_ms());
            debug!(%id, "local optimistic change outstanding; deferred");
            return Resolution::Defer;
        }
        self.apply_draining(id, event)
    }

    fn resolve_merge(&self, id: &EntityId, last: Option<i64>, event: ChangeEvent) -> Resolution {
        let Some(last) = last else {
            return self.apply_draining(id, event);
        };
        let delta = event.timestamp_ms.saturating_sub(last);
        if delta < 0 {
            return self.drop_event(&event, "older than last applied change");
        }
        if delta <= self.settle_window_ms {
            self.pending.defer(id.clone(), event, now_ms());
            debug!(%id, "change within settle window; deferred");
            return Resolution::Defer;
        }
        self.apply_draining(id, event)
    }

    /// Apply `event`, letting a fresher deferred change for the same
    /// entity win over it.
    fn apply_draining(&self, id: &EntityId, event: ChangeEvent) -> Resolution {
        match self.pending.take_fresh(id, now_ms()) {
            Some(deferred) if deferred.timestamp_ms > event.timestamp_ms => {
                debug!(
                    %id,
                    deferred_ms = deferred.timestamp_ms,
                    incoming_ms = event.timestamp_ms,
                    "deferred change wins over incoming"
                );
                self.apply(id, deferred)
            }
            _ => self.apply(id, event),
        }
    }

    fn apply(&self, id: &EntityId, event: ChangeEvent) -> Resolution {
        self.last_applied.record(id, event.timestamp_ms);
        Resolution::Apply(event)
    }

    #[allow(clippy::unused_self)]
    fn drop_event(&self, event: &ChangeEvent, reason: &str) -> Resolution {
        debug!(
            table = %event.table,
            timestamp_ms = event.timestamp_ms,
            reason,
            "dropping change"
        );
        Resolution::Drop {
            reason: reason.to_owned(),
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
