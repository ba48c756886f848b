//! Cache mutation across every cached view of an entity.
//!
//! [`CacheMutator`] is the single logical writer for one namespace of the
//! cache. Each operation updates every view under the namespace as one
//! logical unit: list views and detail views stay consistent with each
//! other. [`CacheMutator::optimistic`] applies a local mutation
//! immediately and returns an [`OptimisticUpdate`] whose rollback
//! restores the exact pre-mutation snapshots if the remote write fails.

use std::sync::Arc;

use tracing::debug;

use ripple_core::EntityId;

use crate::ledger::OptimisticLedger;
use crate::store::{CacheEntity, CacheStore, CachedView, QueryKey};

// ─────────────────────────────────────────────────────────────────────────────
// OptimisticUpdate
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to an in-flight optimistic mutation.
///
/// Must be settled through [`CacheMutator::commit`] or
/// [`CacheMutator::rollback`]; until then the user-wins strategy holds
/// off remote changes to the same entity. Dropping the handle unsettled
/// releases the ledger entry (the mutation stays in the cache), so a
/// lost handle cannot hold off remote changes forever.
#[must_use = "settle the optimistic update via commit() or rollback()"]
pub struct OptimisticUpdate<T> {
    entity: EntityId,
    snapshots: Vec<(QueryKey, CachedView<T>)>,
    ledger: Arc<OptimisticLedger>,
    settled: bool,
}

impl<T> OptimisticUpdate<T> {
    /// The entity this update touches.
    #[must_use]
    pub fn entity(&self) -> &EntityId {
        &self.entity
    }
}

impl<T> Drop for OptimisticUpdate<T> {
    fn drop(&mut self) {
        if !self.settled {
            self.ledger.end(&self.entity);
            debug!(entity = %self.entity, "optimistic update dropped unsettled; ledger entry released");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CacheMutator
// ─────────────────────────────────────────────────────────────────────────────

/// Applies entity changes to every cached view under one namespace.
pub struct CacheMutator<T: CacheEntity> {
    store: Arc<dyn CacheStore<T>>,
    namespace: String,
    optimistic: Arc<OptimisticLedger>,
}

impl<T: CacheEntity> CacheMutator<T> {
    /// Mutator writing views whose keys start with `namespace`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CacheStore<T>>,
        namespace: impl Into<String>,
        optimistic: Arc<OptimisticLedger>,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            optimistic,
        }
    }

    /// The namespace this mutator writes.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Apply an insert: prepend to every list view that does not already
    /// hold the entity, and fill its detail view if one is cached.
    pub fn apply_insert(&self, entity: &T) {
        let id = entity.entity_id();
        for key in self.keys() {
            let _ = self.store.update(&key, &mut |view| match view {
                CachedView::List(items) => {
                    if !items.iter().any(|item| item.entity_id() == id) {
                        items.insert(0, entity.clone());
                    }
                }
                CachedView::Detail(slot) => {
                    if key == self.detail_key(&id) {
                        *slot = Some(entity.clone());
                    }
                }
            });
        }
    }

    /// Apply an update: replace the entity wherever a view holds it.
    /// Views that do not hold it are left alone.
    pub fn apply_update(&self, entity: &T) {
        let id = entity.entity_id();
        for key in self.keys() {
            let _ = self.store.update(&key, &mut |view| match view {
                CachedView::List(items) => {
                    for item in items.iter_mut() {
                        if item.entity_id() == id {
                            *item = entity.clone();
                        }
                    }
                }
                CachedView::Detail(slot) => {
                    if slot.as_ref().is_some_and(|item| item.entity_id() == id) {
                        *slot = Some(entity.clone());
                    }
                }
            });
        }
    }

    /// Apply a delete: remove the entity from list views and empty any
    /// detail view holding it.
    pub fn apply_delete(&self, id: &EntityId) {
        for key in self.keys() {
            let _ = self.store.update(&key, &mut |view| match view {
                CachedView::List(items) => {
                    items.retain(|item| item.entity_id() != *id);
                }
                CachedView::Detail(slot) => {
                    if slot.as_ref().is_some_and(|item| item.entity_id() == *id) {
                        *slot = None;
                    }
                }
            });
        }
    }

    /// Apply `mutate` in place to the entity wherever a view holds it,
    /// without snapshotting (used for derived fields like aggregate
    /// counts, where the change is already authoritative).
    pub fn modify(&self, id: &EntityId, mutate: &mut dyn FnMut(&mut T)) {
        for key in self.keys() {
            let _ = self.store.update(&key, &mut |view| match view {
                CachedView::List(items) => {
                    for item in items.iter_mut() {
                        if item.entity_id() == *id {
                            mutate(item);
                        }
                    }
                }
                CachedView::Detail(slot) => {
                    if let Some(item) = slot {
                        if item.entity_id() == *id {
                            mutate(item);
                        }
                    }
                }
            });
        }
    }

    /// Apply `mutate` to every view holding `id`, snapshotting first.
    ///
    /// The returned handle's rollback restores the snapshots; commit
    /// settles the update and keeps the mutation.
    pub fn optimistic(
        &self,
        id: &EntityId,
        mutate: &mut dyn FnMut(&mut T),
    ) -> OptimisticUpdate<T> {
        let mut snapshots = Vec::new();
        for key in self.keys() {
            let Some(view) = self.store.read(&key) else {
                continue;
            };
            if !view.contains(id) {
                continue;
            }
            snapshots.push((key.clone(), view));
            let _ = self.store.update(&key, &mut |view| match view {
                CachedView::List(items) => {
                    for item in items.iter_mut() {
                        if item.entity_id() == *id {
                            mutate(item);
                        }
                    }
                }
                CachedView::Detail(slot) => {
                    if let Some(item) = slot {
                        if item.entity_id() == *id {
                            mutate(item);
                        }
                    }
                }
            });
        }
        self.optimistic.begin(id);
        debug!(entity = %id, views = snapshots.len(), "optimistic mutation applied");
        OptimisticUpdate {
            entity: id.clone(),
            snapshots,
            ledger: self.optimistic.clone(),
            settled: false,
        }
    }

    /// Keep an optimistic mutation after the remote write succeeded.
    pub fn commit(&self, mut update: OptimisticUpdate<T>) {
        update.settled = true;
        self.optimistic.end(&update.entity);
        debug!(entity = %update.entity, "optimistic mutation committed");
    }

    /// Restore the pre-mutation snapshots after the remote write failed.
    pub fn rollback(&self, mut update: OptimisticUpdate<T>) {
        update.settled = true;
        for (key, view) in std::mem::take(&mut update.snapshots) {
            self.store.write(key, view);
        }
        self.optimistic.end(&update.entity);
        debug!(entity = %update.entity, "optimistic mutation rolled back");
    }

    /// Drop every view under the namespace, forcing refetches.
    pub fn invalidate_all(&self) -> usize {
        self.store.invalidate_prefix(&self.namespace)
    }

    fn keys(&self) -> Vec<QueryKey> {
        self.store.keys_with_prefix(&self.namespace)
    }

    fn detail_key(&self, id: &EntityId) -> QueryKey {
        QueryKey::detail(&self.namespace, id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
