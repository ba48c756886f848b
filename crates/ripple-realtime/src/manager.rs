//! Per-channel connection lifecycle and reconnection state machine.
//!
//! One [`ConnectionManager`] owns one channel subscription:
//!
//! `Idle → Connecting → Connected → {Closed | Erroring}`, with
//! `Erroring → Reconnecting → Connecting` repeating under exponential
//! backoff until either a subscribe acks or the attempt budget is
//! exhausted. Exhaustion is terminal: the manager stays in `Erroring`
//! until an explicit [`reconnect()`](ConnectionManager::reconnect).
//!
//! All operations are non-blocking; completion is observed through
//! [`connection_status()`](ConnectionManager::connection_status)
//! transitions and the `on_error` callback, never through return values.
//! Timer continuations (join timeout, backoff) are tokio tasks guarded by
//! an alive flag and a subscription epoch, so nothing mutates state after
//! teardown. Methods that arm timers must be called within a tokio runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ripple_core::backoff::reconnect_delay;
use ripple_core::backoff::{
    DEFAULT_INITIAL_DELAY_MS, DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS,
};
use ripple_core::{ChangeAction, ChannelId, ConnectionState, ConnectionStatus, SyncError};
use ripple_settings::RealtimeSettings;

use crate::feed::{
    EventFilter, FeatureToggle, FeedChannel, FeedStatus, RealtimeFeedClient, StaticToggle,
    StatusHandler,
};
use crate::router::{ChangeEventRouter, ChannelHandlers, ErrorCallback};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Static configuration for one channel subscription.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Channel id; also the feed channel name.
    pub channel: ChannelId,
    /// Backend table to mirror.
    pub table: String,
    /// Postgres schema of the table.
    pub schema: String,
    /// Restrict the subscription to one action, or `None` for all.
    pub action_filter: Option<ChangeAction>,
    /// Whether channel errors schedule automatic reconnects.
    pub auto_reconnect: bool,
    /// Reconnect attempt budget before terminal erroring.
    pub max_reconnect_attempts: u32,
    /// Initial backoff delay in ms; doubles per attempt.
    pub initial_reconnect_delay_ms: u64,
    /// Window after which an unacked subscribe counts as failed.
    pub join_timeout_ms: u64,
}

impl ConnectionConfig {
    /// Config with defaults for `channel` mirroring `table` in `public`.
    #[must_use]
    pub fn new(channel: impl Into<ChannelId>, table: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            table: table.into(),
            schema: "public".to_owned(),
            action_filter: None,
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            initial_reconnect_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
        }
    }

    /// Config taking reconnect parameters from loaded settings.
    #[must_use]
    pub fn from_settings(
        channel: impl Into<ChannelId>,
        table: impl Into<String>,
        settings: &RealtimeSettings,
    ) -> Self {
        let mut config = Self::new(channel, table);
        config.auto_reconnect = settings.auto_reconnect;
        config.max_reconnect_attempts = settings.max_reconnect_attempts;
        config.initial_reconnect_delay_ms = settings.initial_reconnect_delay_ms;
        config.join_timeout_ms = settings.join_timeout_ms;
        config
    }

    fn filter(&self) -> EventFilter {
        EventFilter {
            schema: self.schema.clone(),
            table: self.table.clone(),
            action: self.action_filter,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    config: ConnectionConfig,
    client: Option<Arc<dyn RealtimeFeedClient>>,
    toggle: Arc<dyn FeatureToggle>,
    handlers: ChannelHandlers,
}

impl ConnectionManagerBuilder {
    /// Provide the feed client. Without one, `subscribe()` fails with
    /// `ClientNotInitialized`.
    #[must_use]
    pub fn client(mut self, client: Arc<dyn RealtimeFeedClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Provide the feature toggle (defaults to always-enabled).
    #[must_use]
    pub fn feature_toggle(mut self, toggle: Arc<dyn FeatureToggle>) -> Self {
        self.toggle = toggle;
        self
    }

    /// Provide the channel callbacks.
    #[must_use]
    pub fn handlers(mut self, handlers: ChannelHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Build the manager in `Idle`.
    #[must_use]
    pub fn build(self) -> ConnectionManager {
        let on_error = self.handlers.on_error.clone();
        let router = ChangeEventRouter::new(self.config.channel.clone(), self.handlers);
        ConnectionManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                client: self.client,
                toggle: self.toggle,
                router,
                on_error,
                error_listeners: Mutex::new(Vec::new()),
                alive: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                state: Mutex::new(StateData::default()),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionManager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns one channel subscription's lifecycle and reconnection loop.
///
/// Cheap to clone handles are not provided on purpose; wrap in `Arc` if a
/// channel must be shared.
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

#[derive(Default)]
struct StateData {
    state: ConnectionState,
    reconnect_attempts: u32,
    error: Option<String>,
    last_connected_at: Option<DateTime<Utc>>,
    last_disconnected_at: Option<DateTime<Utc>>,
    channel: Option<Arc<dyn FeedChannel>>,
    /// Cancels whichever timer is pending (join timeout or backoff).
    pending_timer: Option<CancellationToken>,
    /// The terminal error has been surfaced; don't raise it again.
    max_exceeded_raised: bool,
}

struct ManagerInner {
    config: ConnectionConfig,
    client: Option<Arc<dyn RealtimeFeedClient>>,
    toggle: Arc<dyn FeatureToggle>,
    router: ChangeEventRouter,
    on_error: Option<ErrorCallback>,
    error_listeners: Mutex<Vec<ErrorCallback>>,
    /// False until subscribed, and again after teardown. Checked before
    /// every asynchronous continuation.
    alive: AtomicBool,
    /// Bumped on every (re)subscribe and on teardown; callbacks registered
    /// under an older epoch are ignored.
    epoch: AtomicU64,
    state: Mutex<StateData>,
}

impl ConnectionManager {
    /// Start building a manager for `config`.
    #[must_use]
    pub fn builder(config: ConnectionConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            config,
            client: None,
            toggle: Arc::new(StaticToggle(true)),
            handlers: ChannelHandlers::new(),
        }
    }

    /// The channel this manager owns.
    #[must_use]
    pub fn channel_id(&self) -> &ChannelId {
        &self.inner.config.channel
    }

    /// Snapshot of the current connection status.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        let st = self.inner.state.lock();
        ConnectionStatus {
            state: st.state,
            is_connected: st.state.is_connected(),
            is_connecting: st.state.is_connecting(),
            error: st.error.clone(),
            reconnect_attempts: st.reconnect_attempts,
            last_connected_at: st.last_connected_at,
            last_disconnected_at: st.last_disconnected_at,
        }
    }

    /// Open the channel and start the subscription.
    ///
    /// A logged no-op when realtime is disabled; fails with
    /// `ClientNotInitialized` (surfaced via `on_error`) when no feed client
    /// was injected.
    pub fn subscribe(&self) {
        ManagerInner::subscribe(&self.inner);
    }

    /// Cancel pending timers, close the channel, and transition to `Closed`.
    ///
    /// Resets the reconnect attempt counter. In-flight callbacks from the
    /// torn-down subscription are ignored from here on.
    pub fn unsubscribe(&self) {
        self.inner.teardown(ConnectionState::Closed);
    }

    /// Manual reconnect override.
    ///
    /// Cancels timers, clears the error, resets the attempt counter to 0
    /// and re-subscribes. The only way out of terminal `Erroring`.
    pub fn reconnect(&self) {
        {
            let mut st = self.inner.state.lock();
            if let Some(token) = st.pending_timer.take() {
                token.cancel();
            }
            st.reconnect_attempts = 0;
            st.error = None;
            st.max_exceeded_raised = false;
        }
        info!(channel = %self.inner.config.channel, "manual reconnect");
        ManagerInner::subscribe(&self.inner);
    }

    /// Register an additional error listener (used by the coordinator to
    /// forward errors tagged with the channel name).
    pub fn add_error_listener(&self, listener: ErrorCallback) {
        self.inner.error_listeners.lock().push(listener);
    }
}

impl ManagerInner {
    /// True if the manager is live and `epoch` is still the current
    /// subscription. Every asynchronous continuation checks this first.
    fn current(&self, epoch: u64) -> bool {
        self.alive.load(Ordering::Acquire) && self.epoch.load(Ordering::Acquire) == epoch
    }

    fn subscribe(inner: &Arc<Self>) {
        let channel_id = &inner.config.channel;
        if !inner.toggle.realtime_enabled() {
            let err = SyncError::FeatureDisabled {
                channel: channel_id.clone(),
            };
            warn!(%err, "skipping subscribe");
            // Informational: surfaced to listeners, state stays Idle.
            inner.emit_error(&err);
            return;
        }
        let Some(client) = inner.client.clone() else {
            let err = SyncError::ClientNotInitialized;
            {
                let mut st = inner.state.lock();
                st.state = ConnectionState::Erroring;
                st.error = Some(err.to_string());
            }
            inner.emit_error(&err);
            return;
        };

        inner.alive.store(true, Ordering::Release);
        let epoch = inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;

        // Tear down any previous channel handle outside the lock.
        let (previous, timeout_token) = {
            let mut st = inner.state.lock();
            if let Some(token) = st.pending_timer.take() {
                token.cancel();
            }
            let previous = st.channel.take();
            st.state = ConnectionState::Connecting;
            let token = CancellationToken::new();
            st.pending_timer = Some(token.clone());
            (previous, token)
        };
        if let Some(previous) = previous {
            previous.unsubscribe();
        }

        debug!(channel = %channel_id, epoch, "subscribing");
        let channel = client.channel(channel_id.as_str());

        let changes_weak = Arc::downgrade(inner);
        channel.on_changes(
            &inner.config.filter(),
            Arc::new(move |raw| {
                if let Some(inner) = changes_weak.upgrade() {
                    if inner.current(epoch) {
                        inner.router.dispatch(raw);
                    }
                }
            }),
        );

        {
            let mut st = inner.state.lock();
            st.channel = Some(channel.clone());
        }

        let status_weak = Arc::downgrade(inner);
        let status_handler: StatusHandler = Arc::new(move |status, message| {
            if let Some(inner) = status_weak.upgrade() {
                inner.on_feed_status(epoch, status, message);
            }
        });
        channel.subscribe(status_handler);

        // Arm the join timeout. If the ack already arrived synchronously,
        // the token is cancelled and this resolves immediately.
        let timeout = Duration::from_millis(inner.config.join_timeout_ms);
        let timeout_weak = Arc::downgrade(inner);
        drop(tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(timeout) => {
                    if let Some(inner) = timeout_weak.upgrade() {
                        inner.on_join_timeout(epoch);
                    }
                }
                () = timeout_token.cancelled() => {}
            }
        }));
    }

    fn on_feed_status(self: &Arc<Self>, epoch: u64, status: FeedStatus, message: Option<String>) {
        if !self.current(epoch) {
            debug!(channel = %self.config.channel, ?status, "ignoring stale status callback");
            return;
        }
        match status {
            FeedStatus::Subscribed => {
                {
                    let mut st = self.state.lock();
                    if let Some(token) = st.pending_timer.take() {
                        token.cancel();
                    }
                    st.state = ConnectionState::Connected;
                    // The attempt counter resets exactly here, on the ack.
                    st.reconnect_attempts = 0;
                    st.error = None;
                    st.max_exceeded_raised = false;
                    st.last_connected_at = Some(Utc::now());
                }
                info!(channel = %self.config.channel, "channel connected");
            }
            FeedStatus::ChannelError => {
                let err = SyncError::Channel {
                    channel: self.config.channel.clone(),
                    message: message.unwrap_or_else(|| "channel error".to_owned()),
                };
                self.handle_failure(&err);
            }
            FeedStatus::TimedOut => {
                let err = SyncError::TimedOut {
                    channel: self.config.channel.clone(),
                    timeout_ms: self.config.join_timeout_ms,
                };
                self.handle_failure(&err);
            }
            FeedStatus::Closed => {
                let mut st = self.state.lock();
                if let Some(token) = st.pending_timer.take() {
                    token.cancel();
                }
                if st.state == ConnectionState::Connected {
                    st.last_disconnected_at = Some(Utc::now());
                }
                st.state = ConnectionState::Closed;
                drop(st);
                info!(channel = %self.config.channel, "channel closed by feed");
            }
        }
    }

    fn on_join_timeout(self: &Arc<Self>, epoch: u64) {
        if !self.current(epoch) {
            return;
        }
        {
            let st = self.state.lock();
            if st.state != ConnectionState::Connecting {
                return;
            }
        }
        let err = SyncError::TimedOut {
            channel: self.config.channel.clone(),
            timeout_ms: self.config.join_timeout_ms,
        };
        warn!(channel = %self.config.channel, timeout_ms = self.config.join_timeout_ms, "subscribe unacked; treating as failed");
        self.handle_failure(&err);
    }

    /// Shared failure path for channel errors and timeouts.
    fn handle_failure(self: &Arc<Self>, err: &SyncError) {
        let should_retry = {
            let mut st = self.state.lock();
            if let Some(token) = st.pending_timer.take() {
                token.cancel();
            }
            if st.state == ConnectionState::Connected {
                st.last_disconnected_at = Some(Utc::now());
            }
            st.state = ConnectionState::Erroring;
            st.error = Some(err.to_string());
            self.config.auto_reconnect && err.is_retryable()
        };
        warn!(channel = %self.config.channel, %err, "channel failure");
        self.emit_error(err);
        if should_retry {
            self.attempt_reconnect();
        }
    }

    /// Schedule the next subscribe after backoff, or raise the terminal
    /// error exactly once when the budget is spent.
    fn attempt_reconnect(self: &Arc<Self>) {
        if !self.alive.load(Ordering::Acquire) {
            return;
        }
        enum Next {
            Exhausted(SyncError),
            AlreadyRaised,
            Schedule(Duration, CancellationToken),
        }
        let next = {
            let mut st = self.state.lock();
            if st.reconnect_attempts >= self.config.max_reconnect_attempts {
                if st.max_exceeded_raised {
                    Next::AlreadyRaised
                } else {
                    st.max_exceeded_raised = true;
                    st.state = ConnectionState::Erroring;
                    let err = SyncError::MaxReconnectExceeded {
                        channel: self.config.channel.clone(),
                        max_attempts: self.config.max_reconnect_attempts,
                    };
                    st.error = Some(err.to_string());
                    Next::Exhausted(err)
                }
            } else {
                let attempt = st.reconnect_attempts;
                st.reconnect_attempts += 1;
                st.state = ConnectionState::Reconnecting;
                let delay = reconnect_delay(attempt, self.config.initial_reconnect_delay_ms);
                let token = CancellationToken::new();
                st.pending_timer = Some(token.clone());
                Next::Schedule(delay, token)
            }
        };
        match next {
            Next::Exhausted(err) => {
                warn!(channel = %self.config.channel, %err, "entering terminal erroring");
                self.emit_error(&err);
            }
            Next::AlreadyRaised => {}
            Next::Schedule(delay, token) => {
                debug!(channel = %self.config.channel, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                let weak = Arc::downgrade(self);
                drop(tokio::spawn(async move {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {
                            if let Some(inner) = weak.upgrade() {
                                if inner.alive.load(Ordering::Acquire) {
                                    ManagerInner::subscribe(&inner);
                                }
                            }
                        }
                        () = token.cancelled() => {}
                    }
                }));
            }
        }
    }

    /// Tear down the subscription into `final_state`.
    fn teardown(&self, final_state: ConnectionState) {
        self.alive.store(false, Ordering::Release);
        let _ = self.epoch.fetch_add(1, Ordering::AcqRel);
        let channel = {
            let mut st = self.state.lock();
            if let Some(token) = st.pending_timer.take() {
                token.cancel();
            }
            if st.state == ConnectionState::Connected {
                st.last_disconnected_at = Some(Utc::now());
            }
            st.state = final_state;
            st.reconnect_attempts = 0;
            st.max_exceeded_raised = false;
            st.channel.take()
        };
        if let Some(channel) = channel {
            channel.unsubscribe();
        }
        info!(channel = %self.config.channel, state = %final_state, "unsubscribed");
    }

    /// Invoke the consumer's `on_error` plus any registered listeners.
    /// Never called with the state lock held; handlers may reenter the
    /// manager (e.g. call `reconnect()`).
    fn emit_error(&self, err: &SyncError) {
        let listeners: Vec<ErrorCallback> = self.error_listeners.lock().clone();
        if let Some(on_error) = &self.on_error {
            on_error(err);
        }
        for listener in listeners {
            listener(err);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.teardown(ConnectionState::Closed);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
