//! Domain layer for the Ripple sync engine.
//!
//! Canonical entities (posts, notifications, likes, comments), the
//! adapters that build them from raw backend rows, and the pipelines
//! that wire channel callbacks through conflict resolution into the
//! cache. Aggregators derive post like/comment counts from the like and
//! comment event streams.

pub mod adapters;
pub mod entities;
pub mod pipeline;

pub use adapters::{
    CommentAdapter, LikeAdapter, NotificationAdapter, PostAdapter, ProfileLookup, StaticProfiles,
};
pub use entities::{Author, Comment, Like, Notification, Post};
pub use pipeline::{
    AdaptFn, AppliedHook, CommentAggregator, DropHook, EntityPipeline, LikeAggregator,
};
