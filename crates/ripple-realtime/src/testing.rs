//! Scripted in-memory feed for tests.
//!
//! [`FakeFeedClient`] hands out [`FakeChannel`] handles whose subscribe
//! acks are scripted per channel name. Acks are delivered synchronously
//! from within `subscribe` (as a feed client is allowed to do), except
//! [`ScriptedAck::OkAfterMs`] which is delivered from a timer task and
//! pairs with `#[tokio::test(start_paused = true)]`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;

use ripple_core::RawChange;

use crate::feed::{
    ChangeHandler, EventFilter, FeedChannel, FeedStatus, RealtimeFeedClient, StatusHandler,
};

/// How a [`FakeChannel`] answers one subscribe call.
#[derive(Clone, Copy, Debug)]
pub enum ScriptedAck {
    /// Ack with `Subscribed` synchronously.
    Ok,
    /// Ack with `ChannelError` and this message synchronously.
    Error(&'static str),
    /// Never ack; lets the join timeout fire.
    Silent,
    /// Ack with `Subscribed` after a delay on the tokio clock.
    OkAfterMs(u64),
    /// Ack with `ChannelError` after a delay on the tokio clock.
    ErrorAfterMs(u64, &'static str),
}

#[derive(Default)]
struct ChannelScript {
    acks: VecDeque<ScriptedAck>,
    always_error: Option<String>,
}

#[derive(Default)]
struct ChannelState {
    script: ChannelScript,
    subscribe_calls: usize,
    unsubscribed: bool,
    filter: Option<EventFilter>,
    on_changes: Option<ChangeHandler>,
    on_status: Option<StatusHandler>,
}

/// One scripted channel handle.
#[derive(Default)]
pub struct FakeChannel {
    state: Mutex<ChannelState>,
}

impl FakeChannel {
    /// How many times `subscribe` was called on this handle.
    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }

    /// Whether `unsubscribe` has been called since the last subscribe.
    #[must_use]
    pub fn is_unsubscribed(&self) -> bool {
        self.state.lock().unsubscribed
    }

    /// Deliver a raw change payload to the registered change handler.
    pub fn push_change(&self, raw: RawChange) {
        let handler = self.state.lock().on_changes.clone();
        if let Some(handler) = handler {
            handler(raw);
        }
    }

    /// Deliver an insert of `{"id": id}` stamped at `timestamp_ms`.
    pub fn push_insert(&self, id: &str, timestamp_ms: i64) {
        let table = self.table();
        self.push_change(RawChange {
            table,
            schema: "public".to_owned(),
            event_type: "INSERT".to_owned(),
            old: None,
            new: Some(json!({ "id": id })),
            commit_timestamp: rfc3339(timestamp_ms),
            user_id: None,
        });
    }

    /// Deliver an update carrying `new` as the new row.
    pub fn push_update(&self, new: serde_json::Value, timestamp_ms: i64) {
        let table = self.table();
        self.push_change(RawChange {
            table,
            schema: "public".to_owned(),
            event_type: "UPDATE".to_owned(),
            old: None,
            new: Some(new),
            commit_timestamp: rfc3339(timestamp_ms),
            user_id: None,
        });
    }

    /// Deliver a delete whose old row is `{"id": id}`.
    pub fn push_delete(&self, id: &str, timestamp_ms: i64) {
        let table = self.table();
        self.push_change(RawChange {
            table,
            schema: "public".to_owned(),
            event_type: "DELETE".to_owned(),
            old: Some(json!({ "id": id })),
            new: None,
            commit_timestamp: rfc3339(timestamp_ms),
            user_id: None,
        });
    }

    /// Deliver a status transition through the registered status handler,
    /// simulating a feed-side event after subscription.
    pub fn emit_status(&self, status: FeedStatus, message: Option<&str>) {
        let handler = self.state.lock().on_status.clone();
        if let Some(handler) = handler {
            handler(status, message.map(str::to_owned));
        }
    }

    fn table(&self) -> String {
        self.state
            .lock()
            .filter
            .as_ref()
            .map_or_else(|| "posts".to_owned(), |f| f.table.clone())
    }

    fn next_ack(&self) -> Ack {
        let mut state = self.state.lock();
        if let Some(message) = &state.script.always_error {
            return Ack::Error(message.clone());
        }
        match state.script.acks.pop_front() {
            Some(ScriptedAck::Ok) => Ack::Ok,
            Some(ScriptedAck::Error(message)) => Ack::Error(message.to_owned()),
            Some(ScriptedAck::OkAfterMs(ms)) => Ack::OkAfterMs(ms),
            Some(ScriptedAck::ErrorAfterMs(ms, message)) => Ack::ErrorAfterMs(ms, message.to_owned()),
            Some(ScriptedAck::Silent) | None => Ack::Silent,
        }
    }
}

enum Ack {
    Ok,
    Error(String),
    Silent,
    OkAfterMs(u64),
    ErrorAfterMs(u64, String),
}

impl FeedChannel for FakeChannel {
    fn on_changes(&self, filter: &EventFilter, handler: ChangeHandler) {
        let mut state = self.state.lock();
        state.filter = Some(filter.clone());
        state.on_changes = Some(handler);
    }

    fn subscribe(&self, on_status: StatusHandler) {
        {
            let mut state = self.state.lock();
            state.subscribe_calls += 1;
            state.unsubscribed = false;
            state.on_status = Some(on_status.clone());
        }
        match self.next_ack() {
            Ack::Ok => on_status(FeedStatus::Subscribed, None),
            Ack::Error(message) => {
                on_status(FeedStatus::ChannelError, Some(message));
            }
            Ack::Silent => {}
            Ack::OkAfterMs(ms) => {
                drop(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    on_status(FeedStatus::Subscribed, None);
                }));
            }
            Ack::ErrorAfterMs(ms, message) => {
                drop(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    on_status(FeedStatus::ChannelError, Some(message));
                }));
            }
        }
    }

    fn unsubscribe(&self) {
        self.state.lock().unsubscribed = true;
    }
}

/// A [`RealtimeFeedClient`] backed by scripted [`FakeChannel`]s.
///
/// `channel(name)` returns the same handle for the same name, so tests can
/// script a channel before or after the manager opens it.
#[derive(Default)]
pub struct FakeFeedClient {
    channels: Mutex<HashMap<String, Arc<FakeChannel>>>,
}

impl FakeFeedClient {
    /// New client with no channels scripted.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the subscribe acks for `name`, clearing any previous script.
    pub fn script(&self, name: &str, acks: impl IntoIterator<Item = ScriptedAck>) {
        let handle = self.handle(name);
        let mut state = handle.state.lock();
        state.script.always_error = None;
        state.script.acks = acks.into_iter().collect();
    }

    /// Make every subscribe on `name` ack with a channel error.
    pub fn script_always_error(&self, name: &str, message: &str) {
        let handle = self.handle(name);
        let mut state = handle.state.lock();
        state.script.acks.clear();
        state.script.always_error = Some(message.to_owned());
    }

    /// The channel handle for `name`, creating it if needed.
    #[must_use]
    pub fn channel_handle(&self, name: &str) -> Arc<FakeChannel> {
        self.handle(name)
    }

    /// Subscribe calls seen by `name` so far.
    #[must_use]
    pub fn subscribe_calls(&self, name: &str) -> usize {
        self.handle(name).subscribe_calls()
    }

    fn handle(&self, name: &str) -> Arc<FakeChannel> {
        let mut channels = self.channels.lock();
        channels
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(FakeChannel::default()))
            .clone()
    }
}

impl RealtimeFeedClient for FakeFeedClient {
    fn channel(&self, name: &str) -> Arc<dyn FeedChannel> {
        self.handle(name)
    }
}

fn rfc3339(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn same_name_returns_same_handle() {
        let feed = FakeFeedClient::new();
        let a = feed.channel_handle("posts");
        feed.script("posts", [ScriptedAck::Ok]);
        let b = feed.channel_handle("posts");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn scripted_acks_are_consumed_in_order() {
        let feed = FakeFeedClient::new();
        feed.script("posts", [ScriptedAck::Error("boom"), ScriptedAck::Ok]);
        let handle = feed.channel_handle("posts");
        let seen: Arc<Mutex<Vec<FeedStatus>>> = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..3 {
            let sink = seen.clone();
            handle.subscribe(Arc::new(move |status, _| sink.lock().push(status)));
        }
        // Third subscribe falls off the script and stays silent.
        assert_eq!(
            *seen.lock(),
            vec![FeedStatus::ChannelError, FeedStatus::Subscribed]
        );
        assert_eq!(handle.subscribe_calls(), 3);
    }

    #[test]
    fn push_insert_uses_registered_filter_table() {
        let feed = FakeFeedClient::new();
        let handle = feed.channel_handle("notifications");
        let seen: Arc<Mutex<Vec<RawChange>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        handle.on_changes(
            &EventFilter::all("public", "notifications"),
            Arc::new(move |raw| sink.lock().push(raw)),
        );
        handle.push_insert("n1", 5000);
        let raw = seen.lock().pop().unwrap();
        assert_eq!(raw.table, "notifications");
        assert_eq!(raw.event_type, "INSERT");
    }
}
