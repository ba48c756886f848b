//! Cached query views and the store they live in.
//!
//! The cache is keyed by [`QueryKey`] (colon-separated segments, first
//! segment is the namespace, e.g. `posts:feed` or `posts:detail:p1`).
//! Each key holds one [`CachedView`]: either a list of entities or a
//! single detail entity. [`MemoryCacheStore`] is the in-process
//! implementation; the store is a trait so an embedding app can back it
//! with its own query cache.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use ripple_core::EntityId;

// ─────────────────────────────────────────────────────────────────────────────
// CacheEntity
// ─────────────────────────────────────────────────────────────────────────────

/// An entity that can live in cached views.
pub trait CacheEntity: Clone + Send + Sync + 'static {
    /// Stable id used to match entities across views.
    fn entity_id(&self) -> EntityId;
}

// ─────────────────────────────────────────────────────────────────────────────
// QueryKey
// ─────────────────────────────────────────────────────────────────────────────

/// Key of one cached query, colon-separated segments.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    /// Key from its raw string form.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Conventional key for the detail view of one entity.
    #[must_use]
    pub fn detail(namespace: &str, id: &EntityId) -> Self {
        Self(format!("{namespace}:detail:{id}"))
    }

    /// The raw key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first segment of the key.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CachedView
// ─────────────────────────────────────────────────────────────────────────────

/// The cached result of one query.
#[derive(Clone, Debug, PartialEq)]
pub enum CachedView<T> {
    /// An ordered list of entities (feeds, comment threads).
    List(Vec<T>),
    /// A single entity, absent when deleted or not yet loaded.
    Detail(Option<T>),
}

impl<T: CacheEntity> CachedView<T> {
    /// Whether the view currently holds `id`.
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        match self {
            Self::List(items) => items.iter().any(|item| item.entity_id() == *id),
            Self::Detail(item) => item.as_ref().is_some_and(|item| item.entity_id() == *id),
        }
    }

    /// Number of entities in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::List(items) => items.len(),
            Self::Detail(item) => usize::from(item.is_some()),
        }
    }

    /// Whether the view holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CacheStore
// ─────────────────────────────────────────────────────────────────────────────

/// Storage for cached views.
pub trait CacheStore<T: CacheEntity>: Send + Sync {
    /// Read the view under `key`.
    fn read(&self, key: &QueryKey) -> Option<CachedView<T>>;

    /// Write (or replace) the view under `key`.
    fn write(&self, key: QueryKey, view: CachedView<T>);

    /// Mutate the view under `key` in place. Returns false when absent.
    fn update(&self, key: &QueryKey, mutate: &mut dyn FnMut(&mut CachedView<T>)) -> bool;

    /// All keys whose raw form starts with `prefix`, in key order.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<QueryKey>;

    /// Drop the view under `key`. Returns whether it existed.
    fn invalidate(&self, key: &QueryKey) -> bool;

    /// Drop every view whose key starts with `prefix`. Returns the count.
    fn invalidate_prefix(&self, prefix: &str) -> usize;

    /// Drop every view tagged by one of `tags` (a tag is a key prefix).
    /// Returns the count.
    fn invalidate_tags(&self, tags: &[&str]) -> usize {
        tags.iter().map(|tag| self.invalidate_prefix(tag)).sum()
    }
}

/// In-process [`CacheStore`] over a `BTreeMap`.
pub struct MemoryCacheStore<T> {
    views: RwLock<BTreeMap<QueryKey, CachedView<T>>>,
}

impl<T> MemoryCacheStore<T> {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            views: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T> Default for MemoryCacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CacheEntity> CacheStore<T> for MemoryCacheStore<T> {
    fn read(&self, key: &QueryKey) -> Option<CachedView<T>> {
        self.views.read().get(key).cloned()
    }

    fn write(&self, key: QueryKey, view: CachedView<T>) {
        let _ = self.views.write().insert(key, view);
    }

    fn update(&self, key: &QueryKey, mutate: &mut dyn FnMut(&mut CachedView<T>)) -> bool {
        let mut views = self.views.write();
        match views.get_mut(key) {
            Some(view) => {
                mutate(view);
                true
            }
            None => false,
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<QueryKey> {
        self.views
            .read()
            .keys()
            .filter(|key| key.as_str().starts_with(prefix))
            .cloned()
            .collect()
    }

    fn invalidate(&self, key: &QueryKey) -> bool {
        self.views.write().remove(key).is_some()
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut views = self.views.write();
        let keys: Vec<QueryKey> = views
            .keys()
            .filter(|key| key.as_str().starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            let _ = views.remove(key);
        }
        keys.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
