//! Channel connection management and change routing.
//!
//! The realtime layer keeps the app's caches live against the backend
//! change feed. Each channel gets a [`ConnectionManager`] driving its
//! subscribe/reconnect state machine; a [`MultiChannelCoordinator`] fans
//! lifecycle operations across channels and aggregates their statuses;
//! a [`ChangeEventRouter`] validates raw payloads and dispatches them to
//! typed insert/update/delete handlers.
//!
//! The transport is injected behind the [`RealtimeFeedClient`] trait, so
//! the whole layer runs against a scripted in-memory feed in tests.

pub mod coordinator;
pub mod feed;
pub mod manager;
pub mod router;
pub mod testing;

pub use coordinator::{GlobalConnectionStatus, GlobalErrorCallback, MultiChannelCoordinator};
pub use feed::{
    ChangeHandler, EventFilter, FeatureToggle, FeedChannel, FeedStatus, RealtimeFeedClient,
    StaticToggle, StatusHandler,
};
pub use manager::{ConnectionConfig, ConnectionManager, ConnectionManagerBuilder};
pub use router::{ChangeEventRouter, ChannelHandlers, ErrorCallback, EventCallback};
