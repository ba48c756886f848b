//! Fan-out coordination over a set of connection managers.
//!
//! The coordinator owns one [`ConnectionManager`] per channel id, fans
//! subscribe/unsubscribe/reconnect out to all of them, and aggregates
//! their statuses into one [`GlobalConnectionStatus`] for the app shell
//! (e.g. an offline banner wants `all_connected`, a spinner wants
//! `any_connecting`).

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use ripple_core::{ChannelId, ConnectionStatus, SyncError};

use crate::manager::ConnectionManager;

/// Callback invoked with every error any managed channel surfaces,
/// tagged with the channel it came from.
pub type GlobalErrorCallback = Arc<dyn Fn(&ChannelId, &SyncError) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate status
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate connection status across all managed channels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConnectionStatus {
    /// Number of managed channels.
    pub total_channels: usize,
    /// Channels currently connected.
    pub connected_channels: usize,
    /// Channels currently connecting or reconnecting.
    pub connecting_channels: usize,
    /// Channels currently carrying an error.
    pub errored_channels: usize,
    /// True when every managed channel is connected (false when empty).
    pub all_connected: bool,
    /// True when any channel is connecting or reconnecting.
    pub any_connecting: bool,
    /// True when any channel carries an error.
    pub has_errors: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// MultiChannelCoordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Registry and fan-out layer over per-channel [`ConnectionManager`]s.
///
/// Channel ids are unique: registering a second manager for an id the
/// coordinator already owns fails with [`SyncError::DuplicateChannel`].
#[derive(Default)]
pub struct MultiChannelCoordinator {
    channels: Mutex<Vec<(ChannelId, Arc<ConnectionManager>)>>,
    error_listeners: Arc<Mutex<Vec<GlobalErrorCallback>>>,
}

impl MultiChannelCoordinator {
    /// Empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `manager` under its channel id.
    ///
    /// The manager's errors are forwarded to this coordinator's error
    /// listeners from here on. Does not subscribe.
    pub fn add_channel(&self, manager: Arc<ConnectionManager>) -> Result<(), SyncError> {
        let channel = manager.channel_id().clone();
        {
            let mut channels = self.channels.lock();
            if channels.iter().any(|(id, _)| *id == channel) {
                return Err(SyncError::DuplicateChannel { channel });
            }
            channels.push((channel.clone(), manager.clone()));
        }
        let listeners = self.error_listeners.clone();
        let tag = channel.clone();
        manager.add_error_listener(Arc::new(move |err| {
            let listeners: Vec<GlobalErrorCallback> = listeners.lock().clone();
            for listener in listeners {
                listener(&tag, err);
            }
        }));
        info!(%channel, "channel registered");
        Ok(())
    }

    /// Unsubscribe and remove the manager for `channel`.
    ///
    /// Returns the manager, or `None` if the id was not registered.
    pub fn remove_channel(&self, channel: &ChannelId) -> Option<Arc<ConnectionManager>> {
        let removed = {
            let mut channels = self.channels.lock();
            let index = channels.iter().position(|(id, _)| id == channel)?;
            Some(channels.remove(index).1)
        };
        if let Some(manager) = &removed {
            manager.unsubscribe();
            info!(%channel, "channel removed");
        }
        removed
    }

    /// Register a listener for errors from any managed channel.
    pub fn add_error_listener(&self, listener: GlobalErrorCallback) {
        self.error_listeners.lock().push(listener);
    }

    /// Subscribe every managed channel, in registration order.
    pub fn subscribe_all(&self) {
        for manager in self.managers() {
            manager.subscribe();
        }
    }

    /// Unsubscribe every managed channel.
    pub fn unsubscribe_all(&self) {
        for manager in self.managers() {
            manager.unsubscribe();
        }
    }

    /// Manually reconnect every managed channel, resetting attempt budgets.
    pub fn reconnect_all(&self) {
        for manager in self.managers() {
            manager.reconnect();
        }
    }

    /// Status snapshot for one channel.
    #[must_use]
    pub fn status_for(&self, channel: &ChannelId) -> Option<ConnectionStatus> {
        let manager = {
            let channels = self.channels.lock();
            channels
                .iter()
                .find(|(id, _)| id == channel)
                .map(|(_, m)| m.clone())
        }?;
        Some(manager.connection_status())
    }

    /// Per-channel status snapshots, in registration order.
    #[must_use]
    pub fn statuses(&self) -> Vec<(ChannelId, ConnectionStatus)> {
        let channels: Vec<(ChannelId, Arc<ConnectionManager>)> = self.channels.lock().clone();
        channels
            .into_iter()
            .map(|(id, manager)| (id, manager.connection_status()))
            .collect()
    }

    /// Aggregate status across every managed channel.
    #[must_use]
    pub fn global_status(&self) -> GlobalConnectionStatus {
        let statuses = self.statuses();
        let total_channels = statuses.len();
        let mut status = GlobalConnectionStatus {
            total_channels,
            ..GlobalConnectionStatus::default()
        };
        for (_, s) in &statuses {
            if s.is_connected {
                status.connected_channels += 1;
            }
            if s.is_connecting {
                status.connecting_channels += 1;
            }
            if s.error.is_some() {
                status.errored_channels += 1;
            }
        }
        status.all_connected = total_channels > 0 && status.connected_channels == total_channels;
        status.any_connecting = status.connecting_channels > 0;
        status.has_errors = status.errored_channels > 0;
        status
    }

    /// Registered channel ids, in registration order.
    #[must_use]
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    fn managers(&self) -> Vec<Arc<ConnectionManager>> {
        self.channels.lock().iter().map(|(_, m)| m.clone()).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
