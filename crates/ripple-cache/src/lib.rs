//! Cached-view mutation and conflict resolution.
//!
//! Validated change events flow through a [`ConflictResolver`] (latest,
//! user-wins, or merge strategy) and, when applied, a [`CacheMutator`]
//! updates every cached view of the entity as one logical unit. Local
//! optimistic mutations go through [`CacheMutator::optimistic`] and are
//! rolled back from snapshots if the remote write fails.

pub mod ledger;
pub mod mutator;
pub mod resolver;
pub mod store;

pub use ledger::{LastAppliedLedger, OptimisticLedger, PendingUpdateQueue};
pub use mutator::{CacheMutator, OptimisticUpdate};
pub use resolver::{ConflictResolver, Resolution};
pub use store::{CacheEntity, CacheStore, CachedView, MemoryCacheStore, QueryKey};
