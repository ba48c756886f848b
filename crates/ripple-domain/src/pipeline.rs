//! End-to-end wiring from channel callbacks to cache mutations.
//!
//! An [`EntityPipeline`] is registered as a channel's insert/update/delete
//! handlers. Each event passes through the conflict resolver; applied
//! events are adapted into the canonical entity and written across all
//! cached views. Applied hooks run afterwards so aggregators (like and
//! comment counts on posts) can derive from the same event stream.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use ripple_cache::{CacheEntity, CacheMutator, ConflictResolver, Resolution};
use ripple_core::{ChangeAction, ChangeEvent, IdentityProvider, SyncError};
use ripple_realtime::ChannelHandlers;

use crate::adapters::{CommentAdapter, LikeAdapter, ProfileLookup};
use crate::entities::Post;

/// Adapter closure from a raw row to a canonical entity.
pub type AdaptFn<T> = Arc<dyn Fn(&Value) -> Result<T, SyncError> + Send + Sync>;

/// Hook invoked after an event was applied to the cache.
pub type AppliedHook = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Hook invoked with the taxonomy error when the resolver drops an event.
pub type DropHook = Arc<dyn Fn(&SyncError) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// EntityPipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Resolver + adapter + mutator chain for one channel's entity type.
pub struct EntityPipeline<T: CacheEntity> {
    resolver: Arc<ConflictResolver>,
    mutator: Arc<CacheMutator<T>>,
    adapt: AdaptFn<T>,
    applied_hooks: Vec<AppliedHook>,
    drop_hooks: Vec<DropHook>,
}

impl<T: CacheEntity> Clone for EntityPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            mutator: self.mutator.clone(),
            adapt: self.adapt.clone(),
            applied_hooks: self.applied_hooks.clone(),
            drop_hooks: self.drop_hooks.clone(),
        }
    }
}

impl<T: CacheEntity> EntityPipeline<T> {
    /// Pipeline applying `adapt`ed entities through `mutator` after
    /// `resolver` lets them pass.
    #[must_use]
    pub fn new(
        resolver: Arc<ConflictResolver>,
        mutator: Arc<CacheMutator<T>>,
        adapt: AdaptFn<T>,
    ) -> Self {
        Self {
            resolver,
            mutator,
            adapt,
            applied_hooks: Vec::new(),
            drop_hooks: Vec::new(),
        }
    }

    /// Run `hook` after every applied event.
    #[must_use]
    pub fn with_applied_hook(mut self, hook: AppliedHook) -> Self {
        self.applied_hooks.push(hook);
        self
    }

    /// Run `hook` with the [`SyncError::ConflictDrop`] for every event the
    /// resolver discards.
    #[must_use]
    pub fn with_drop_hook(mut self, hook: DropHook) -> Self {
        self.drop_hooks.push(hook);
        self
    }

    /// The resolver this pipeline consults.
    #[must_use]
    pub fn resolver(&self) -> &Arc<ConflictResolver> {
        &self.resolver
    }

    /// The mutator this pipeline writes through.
    #[must_use]
    pub fn mutator(&self) -> &Arc<CacheMutator<T>> {
        &self.mutator
    }

    /// Channel handlers dispatching into this pipeline.
    #[must_use]
    pub fn handlers(&self) -> ChannelHandlers {
        let (insert, update, delete) = (self.clone(), self.clone(), self.clone());
        ChannelHandlers::new()
            .on_insert(move |event| insert.handle(event))
            .on_update(move |event| update.handle(event))
            .on_delete(move |event| delete.handle(event))
    }

    /// Resolve and, if applicable, apply one event.
    pub fn handle(&self, event: ChangeEvent) {
        let entity = event.entity_id();
        let timestamp_ms = event.timestamp_ms;
        match self.resolver.resolve(event) {
            Resolution::Apply(event) => self.apply(&event),
            Resolution::Defer => {}
            Resolution::Drop { reason } => {
                let Some(entity) = entity else {
                    debug!(namespace = self.mutator.namespace(), reason, "change not applied");
                    return;
                };
                let err = SyncError::ConflictDrop {
                    entity,
                    timestamp_ms,
                    reason,
                };
                debug!(namespace = self.mutator.namespace(), %err, "change not applied");
                for hook in &self.drop_hooks {
                    hook(&err);
                }
            }
        }
    }

    fn apply(&self, event: &ChangeEvent) {
        match event.action {
            ChangeAction::Insert | ChangeAction::Update => {
                let Some(row) = event.new_row.as_ref() else {
                    warn!(table = %event.table, "change has no new row; skipping");
                    return;
                };
                match (self.adapt)(row) {
                    Ok(entity) => {
                        if event.action == ChangeAction::Insert {
                            self.mutator.apply_insert(&entity);
                        } else {
                            self.mutator.apply_update(&entity);
                        }
                    }
                    Err(err) => {
                        warn!(table = %event.table, %err, "row failed to adapt; skipping");
                        return;
                    }
                }
            }
            ChangeAction::Delete => {
                let Some(id) = event.entity_id() else {
                    warn!(table = %event.table, "delete has no entity id; skipping");
                    return;
                };
                self.mutator.apply_delete(&id);
            }
        }
        for hook in &self.applied_hooks {
            hook(event);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregators
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps post like counts and `liked_by_me` in step with like events.
pub struct LikeAggregator {
    posts: Arc<CacheMutator<Post>>,
    adapter: LikeAdapter,
}

impl LikeAggregator {
    /// Aggregator writing derived like state into `posts` views.
    #[must_use]
    pub fn new(posts: Arc<CacheMutator<Post>>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            posts,
            adapter: LikeAdapter::new(identity),
        }
    }

    /// Hook form for [`EntityPipeline::with_applied_hook`].
    #[must_use]
    pub fn hook(self) -> AppliedHook {
        Arc::new(move |event| self.on_applied(event))
    }

    /// Derive post like state from one applied like event.
    pub fn on_applied(&self, event: &ChangeEvent) {
        let row = match event.action {
            ChangeAction::Insert => event.new_row.as_ref(),
            ChangeAction::Delete => event.old_row.as_ref(),
            ChangeAction::Update => return,
        };
        let Some(row) = row else { return };
        let like = match self.adapter.adapt(row) {
            Ok(like) => like,
            Err(err) => {
                warn!(%err, "like row failed to adapt; counts not adjusted");
                return;
            }
        };
        match event.action {
            ChangeAction::Insert => self.posts.modify(&like.post_id, &mut |post| {
                post.like_count += 1;
                if like.by_me {
                    post.liked_by_me = true;
                }
            }),
            ChangeAction::Delete => self.posts.modify(&like.post_id, &mut |post| {
                post.like_count = post.like_count.saturating_sub(1);
                if like.by_me {
                    post.liked_by_me = false;
                }
            }),
            ChangeAction::Update => {}
        }
    }
}

/// Keeps post comment counts in step with comment events.
pub struct CommentAggregator {
    posts: Arc<CacheMutator<Post>>,
    adapter: CommentAdapter,
}

impl CommentAggregator {
    /// Aggregator writing derived comment counts into `posts` views.
    #[must_use]
    pub fn new(
        posts: Arc<CacheMutator<Post>>,
        profiles: Arc<dyn ProfileLookup>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            posts,
            adapter: CommentAdapter::new(profiles, identity),
        }
    }

    /// Hook form for [`EntityPipeline::with_applied_hook`].
    #[must_use]
    pub fn hook(self) -> AppliedHook {
        Arc::new(move |event| self.on_applied(event))
    }

    /// Derive post comment counts from one applied comment event.
    pub fn on_applied(&self, event: &ChangeEvent) {
        let (row, delta) = match event.action {
            ChangeAction::Insert => (event.new_row.as_ref(), 1i64),
            ChangeAction::Delete => (event.old_row.as_ref(), -1i64),
            ChangeAction::Update => return,
        };
        let Some(row) = row else { return };
        let comment = match self.adapter.adapt(row) {
            Ok(comment) => comment,
            Err(err) => {
                warn!(%err, "comment row failed to adapt; counts not adjusted");
                return;
            }
        };
        self.posts.modify(&comment.post_id, &mut |post| {
            if delta > 0 {
                post.comment_count += 1;
            } else {
                post.comment_count = post.comment_count.saturating_sub(1);
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use ripple_cache::{CacheStore, CachedView, MemoryCacheStore, OptimisticLedger, QueryKey};
    use ripple_core::{ConflictStrategy, EntityId, StaticIdentity, UserId};

    use crate::adapters::{PostAdapter, StaticProfiles};
    use crate::entities::Author;

    struct Fixture {
        store: Arc<MemoryCacheStore<Post>>,
        posts: Arc<CacheMutator<Post>>,
        pipeline: EntityPipeline<Post>,
    }

    fn fixture(strategy: ConflictStrategy) -> Fixture {
        let identity = StaticIdentity::signed_in("me");
        let profiles = StaticProfiles::new();
        profiles.insert(Author {
            id: UserId::from("u1"),
            display_name: "Ada".to_owned(),
            avatar_url: None,
        });
        let ledger = Arc::new(OptimisticLedger::new());
        let resolver = Arc::new(ConflictResolver::new(
            strategy,
            1000,
            30_000,
            identity,
            ledger.clone(),
        ));
        let store = Arc::new(MemoryCacheStore::new());
        store.write(QueryKey::new("posts:feed"), CachedView::List(vec![]));
        let posts = Arc::new(CacheMutator::new(store.clone(), "posts", ledger));
        let adapter = Arc::new(PostAdapter::new(profiles));
        let pipeline = EntityPipeline::new(
            resolver,
            posts.clone(),
            Arc::new(move |row| adapter.adapt(row)),
        );
        Fixture {
            store,
            posts,
            pipeline,
        }
    }

    fn insert_event(id: &str, body: &str, timestamp_ms: i64) -> ChangeEvent {
        ChangeEvent {
            table: "posts".into(),
            action: ChangeAction::Insert,
            old_row: None,
            new_row: Some(json!({ "id": id, "author_id": "u1", "body": body })),
            timestamp_ms,
            originating_user: Some(UserId::from("u1")),
        }
    }

    fn feed_ids(store: &MemoryCacheStore<Post>) -> Vec<String> {
        match store.read(&QueryKey::new("posts:feed")) {
            Some(CachedView::List(items)) => items.into_iter().map(|p| p.id.into_inner()).collect(),
            other => panic!("expected feed list, got {other:?}"),
        }
    }

    #[test]
    fn insert_event_lands_in_feed() {
        let f = fixture(ConflictStrategy::Latest);
        f.pipeline.handle(insert_event("p1", "hello", 100));
        assert_eq!(feed_ids(&f.store), vec!["p1"]);
    }

    #[test]
    fn replayed_event_applies_once() {
        let f = fixture(ConflictStrategy::Latest);
        let event = insert_event("p1", "hello", 100);
        f.pipeline.handle(event.clone());
        f.pipeline.handle(event);
        assert_eq!(feed_ids(&f.store), vec!["p1"]);
    }

    #[test]
    fn update_event_replaces_body() {
        let f = fixture(ConflictStrategy::Latest);
        f.pipeline.handle(insert_event("p1", "hello", 100));
        let mut update = insert_event("p1", "edited", 200);
        update.action = ChangeAction::Update;
        f.pipeline.handle(update);
        match f.store.read(&QueryKey::new("posts:feed")) {
            Some(CachedView::List(items)) => assert_eq!(items[0].body, "edited"),
            other => panic!("expected feed list, got {other:?}"),
        }
    }

    #[test]
    fn delete_event_removes_post() {
        let f = fixture(ConflictStrategy::Latest);
        f.pipeline.handle(insert_event("p1", "hello", 100));
        let delete = ChangeEvent {
            table: "posts".into(),
            action: ChangeAction::Delete,
            old_row: Some(json!({ "id": "p1" })),
            new_row: None,
            timestamp_ms: 200,
            originating_user: None,
        };
        f.pipeline.handle(delete);
        assert_eq!(feed_ids(&f.store), Vec::<String>::new());
    }

    #[test]
    fn merge_defers_second_event_in_window() {
        let f = fixture(ConflictStrategy::Merge);
        f.pipeline.handle(insert_event("p1", "first", 100));
        let mut close = insert_event("p1", "close", 600);
        close.action = ChangeAction::Update;
        f.pipeline.handle(close);
        // Deferred: the cache still shows the first body.
        match f.store.read(&QueryKey::new("posts:feed")) {
            Some(CachedView::List(items)) => assert_eq!(items[0].body, "first"),
            other => panic!("expected feed list, got {other:?}"),
        }
        assert_eq!(f.pipeline.resolver().pending_len(), 1);
    }

    #[test]
    fn replayed_event_surfaces_conflict_drop() {
        let f = fixture(ConflictStrategy::Latest);
        let drops: Arc<parking_lot::Mutex<Vec<SyncError>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = drops.clone();
        let pipeline = f
            .pipeline
            .clone()
            .with_drop_hook(Arc::new(move |err| sink.lock().push(err.clone())));

        let event = insert_event("p1", "hello", 100);
        pipeline.handle(event.clone());
        pipeline.handle(event);

        let drops = drops.lock();
        assert_eq!(drops.len(), 1);
        match &drops[0] {
            SyncError::ConflictDrop {
                entity,
                timestamp_ms,
                ..
            } => {
                assert_eq!(entity, &EntityId::from("p1"));
                assert_eq!(*timestamp_ms, 100);
            }
            other => panic!("expected conflict drop, got {other:?}"),
        }
    }

    #[test]
    fn unadaptable_row_is_skipped_not_fatal() {
        let f = fixture(ConflictStrategy::Latest);
        let mut bad = insert_event("p1", "x", 100);
        bad.new_row = Some(json!({ "id": "p1" }));
        f.pipeline.handle(bad);
        assert_eq!(feed_ids(&f.store), Vec::<String>::new());
        // The pipeline keeps working afterwards.
        f.pipeline.handle(insert_event("p2", "ok", 200));
        assert_eq!(feed_ids(&f.store), vec!["p2"]);
    }

    #[test]
    fn like_events_adjust_post_counts() {
        let f = fixture(ConflictStrategy::Latest);
        f.pipeline.handle(insert_event("p1", "hello", 100));

        let aggregator = LikeAggregator::new(f.posts.clone(), StaticIdentity::signed_in("me"));
        let like_insert = ChangeEvent {
            table: "likes".into(),
            action: ChangeAction::Insert,
            old_row: None,
            new_row: Some(json!({ "id": "l1", "post_id": "p1", "user_id": "me" })),
            timestamp_ms: 200,
            originating_user: Some(UserId::from("me")),
        };
        aggregator.on_applied(&like_insert);
        match f.store.read(&QueryKey::new("posts:feed")) {
            Some(CachedView::List(items)) => {
                assert_eq!(items[0].like_count, 1);
                assert!(items[0].liked_by_me);
            }
            other => panic!("expected feed list, got {other:?}"),
        }

        let like_delete = ChangeEvent {
            table: "likes".into(),
            action: ChangeAction::Delete,
            old_row: Some(json!({ "id": "l1", "post_id": "p1", "user_id": "me" })),
            new_row: None,
            timestamp_ms: 300,
            originating_user: Some(UserId::from("me")),
        };
        aggregator.on_applied(&like_delete);
        match f.store.read(&QueryKey::new("posts:feed")) {
            Some(CachedView::List(items)) => {
                assert_eq!(items[0].like_count, 0);
                assert!(!items[0].liked_by_me);
            }
            other => panic!("expected feed list, got {other:?}"),
        }
    }

    #[test]
    fn comment_events_adjust_comment_count() {
        let f = fixture(ConflictStrategy::Latest);
        f.pipeline.handle(insert_event("p1", "hello", 100));

        let aggregator = CommentAggregator::new(
            f.posts.clone(),
            StaticProfiles::new(),
            StaticIdentity::signed_in("me"),
        );
        let comment_insert = ChangeEvent {
            table: "comments".into(),
            action: ChangeAction::Insert,
            old_row: None,
            new_row: Some(json!({ "id": "c1", "post_id": "p1", "author_id": "u2" })),
            timestamp_ms: 200,
            originating_user: None,
        };
        aggregator.on_applied(&comment_insert);
        match f.store.read(&QueryKey::new("posts:feed")) {
            Some(CachedView::List(items)) => assert_eq!(items[0].comment_count, 1),
            other => panic!("expected feed list, got {other:?}"),
        }
    }

    #[test]
    fn hooks_run_after_apply_through_the_pipeline() {
        let f = fixture(ConflictStrategy::Latest);
        f.pipeline.handle(insert_event("p1", "hello", 100));

        // A like pipeline whose applied hook feeds the aggregator.
        let identity = StaticIdentity::signed_in("me");
        let ledger = Arc::new(OptimisticLedger::new());
        let like_resolver = Arc::new(ConflictResolver::new(
            ConflictStrategy::Latest,
            1000,
            30_000,
            identity.clone(),
            ledger.clone(),
        ));
        let like_store = Arc::new(MemoryCacheStore::new());
        like_store.write(QueryKey::new("likes:recent"), CachedView::List(vec![]));
        let likes = Arc::new(CacheMutator::new(like_store, "likes", ledger));
        let like_adapter = Arc::new(LikeAdapter::new(identity.clone()));
        let aggregator = LikeAggregator::new(f.posts.clone(), identity);
        let like_pipeline = EntityPipeline::new(
            like_resolver,
            likes,
            Arc::new(move |row| like_adapter.adapt(row)),
        )
        .with_applied_hook(aggregator.hook());

        like_pipeline.handle(ChangeEvent {
            table: "likes".into(),
            action: ChangeAction::Insert,
            old_row: None,
            new_row: Some(json!({ "id": "l1", "post_id": "p1", "user_id": "me" })),
            timestamp_ms: 200,
            originating_user: Some(UserId::from("me")),
        });
        match f.store.read(&QueryKey::new("posts:feed")) {
            Some(CachedView::List(items)) => {
                assert_eq!(items[0].like_count, 1);
                assert!(items[0].liked_by_me);
            }
            other => panic!("expected feed list, got {other:?}"),
        }
    }
}
