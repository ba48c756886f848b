//! Collaborator traits for the backend change feed.
//!
//! The sync layer does not own a transport. The embedding app injects a
//! [`RealtimeFeedClient`] (in production, a websocket client speaking the
//! backend's channel protocol) and a [`FeatureToggle`]; tests inject
//! scripted fakes. Both are constructor arguments, never ambient globals.

use std::sync::Arc;

use ripple_core::{ChangeAction, RawChange};

// ─────────────────────────────────────────────────────────────────────────────
// Feed status
// ─────────────────────────────────────────────────────────────────────────────

/// Subscription status reported by the feed's status callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedStatus {
    /// The subscribe was acknowledged; changes will flow.
    Subscribed,
    /// The channel failed.
    ChannelError,
    /// The feed-side join timed out.
    TimedOut,
    /// The channel was closed.
    Closed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Event filter
// ─────────────────────────────────────────────────────────────────────────────

/// Which row changes a channel subscription asks the feed for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFilter {
    /// Postgres schema.
    pub schema: String,
    /// Backend table.
    pub table: String,
    /// Restrict to one action, or `None` for all.
    pub action: Option<ChangeAction>,
}

impl EventFilter {
    /// Filter for all changes on `schema.table`.
    #[must_use]
    pub fn all(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            action: None,
        }
    }

    /// Restrict the filter to a single action.
    #[must_use]
    pub fn action(mut self, action: ChangeAction) -> Self {
        self.action = Some(action);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feed traits
// ─────────────────────────────────────────────────────────────────────────────

/// Callback invoked with each raw change delivered on a channel.
pub type ChangeHandler = Arc<dyn Fn(RawChange) + Send + Sync>;

/// Callback invoked with subscription status transitions.
pub type StatusHandler = Arc<dyn Fn(FeedStatus, Option<String>) + Send + Sync>;

/// One feed channel handle.
///
/// Handlers must be registered before [`subscribe`](Self::subscribe) is
/// called; the feed may acknowledge synchronously from within `subscribe`.
pub trait FeedChannel: Send + Sync {
    /// Register the change handler for rows matching `filter`.
    fn on_changes(&self, filter: &EventFilter, handler: ChangeHandler);

    /// Ask the feed to subscribe; status transitions arrive on `on_status`.
    fn subscribe(&self, on_status: StatusHandler);

    /// Close the channel. Idempotent.
    fn unsubscribe(&self);
}

/// The injected backend feed client.
pub trait RealtimeFeedClient: Send + Sync {
    /// Open (or reuse) a channel handle for `name`.
    fn channel(&self, name: &str) -> Arc<dyn FeedChannel>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Feature toggle
// ─────────────────────────────────────────────────────────────────────────────

/// Gate for the realtime feature as a whole.
pub trait FeatureToggle: Send + Sync {
    /// Whether realtime sync is enabled for this session.
    fn realtime_enabled(&self) -> bool;
}

/// A [`FeatureToggle`] with a fixed answer.
#[derive(Clone, Copy, Debug)]
pub struct StaticToggle(pub bool);

impl FeatureToggle for StaticToggle {
    fn realtime_enabled(&self) -> bool {
        self.0
    }
}
