//! Routing of inbound change payloads to typed handlers.
//!
//! Each raw payload is validated and dispatched by its action tag to exactly
//! one of the insert/update/delete callbacks. Unknown tags and malformed
//! payloads are logged and dropped; they never fail the channel.

use std::sync::Arc;

use tracing::{debug, warn};

use ripple_core::{ChangeAction, ChangeEvent, ChannelId, RawChange, SyncError};

/// Callback invoked with a validated change event.
pub type EventCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Callback invoked when a channel surfaces an error.
pub type ErrorCallback = Arc<dyn Fn(&SyncError) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// ChannelHandlers
// ─────────────────────────────────────────────────────────────────────────────

/// The set of callbacks a consumer registers for one channel.
///
/// All callbacks are optional; unregistered actions are dropped silently.
#[derive(Clone, Default)]
pub struct ChannelHandlers {
    /// Invoked for inserts.
    pub on_insert: Option<EventCallback>,
    /// Invoked for updates.
    pub on_update: Option<EventCallback>,
    /// Invoked for deletes.
    pub on_delete: Option<EventCallback>,
    /// Invoked when the channel surfaces an error.
    pub on_error: Option<ErrorCallback>,
}

impl ChannelHandlers {
    /// Empty handler set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the insert callback.
    #[must_use]
    pub fn on_insert(mut self, f: impl Fn(ChangeEvent) + Send + Sync + 'static) -> Self {
        self.on_insert = Some(Arc::new(f));
        self
    }

    /// Set the update callback.
    #[must_use]
    pub fn on_update(mut self, f: impl Fn(ChangeEvent) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(f));
        self
    }

    /// Set the delete callback.
    #[must_use]
    pub fn on_delete(mut self, f: impl Fn(ChangeEvent) + Send + Sync + 'static) -> Self {
        self.on_delete = Some(Arc::new(f));
        self
    }

    /// Set the error callback.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&SyncError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for ChannelHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandlers")
            .field("on_insert", &self.on_insert.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ChangeEventRouter
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatches raw feed payloads to the channel's typed callbacks.
///
/// The connection manager guards dispatch with its liveness flag, so the
/// router itself holds no teardown state.
pub struct ChangeEventRouter {
    channel: ChannelId,
    handlers: ChannelHandlers,
}

impl ChangeEventRouter {
    /// Build a router for `channel`.
    #[must_use]
    pub fn new(channel: ChannelId, handlers: ChannelHandlers) -> Self {
        Self { channel, handlers }
    }

    /// The handlers this router dispatches to.
    #[must_use]
    pub fn handlers(&self) -> &ChannelHandlers {
        &self.handlers
    }

    /// Validate and dispatch one raw payload.
    ///
    /// Unknown action tags and malformed payloads are logged and dropped.
    pub fn dispatch(&self, raw: RawChange) {
        let event = match ChangeEvent::from_raw(raw) {
            Ok(event) => event,
            Err(err) => {
                warn!(channel = %self.channel, %err, "dropping malformed change payload");
                return;
            }
        };

        let callback = match event.action {
            ChangeAction::Insert => self.handlers.on_insert.as_ref(),
            ChangeAction::Update => self.handlers.on_update.as_ref(),
            ChangeAction::Delete => self.handlers.on_delete.as_ref(),
        };
        match callback {
            Some(callback) => callback(event),
            None => {
                debug!(
                    channel = %self.channel,
                    action = event.action.as_tag(),
                    "no handler registered; dropping change"
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
