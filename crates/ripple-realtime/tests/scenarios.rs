//! Lifecycle scenarios against the scripted in-memory feed.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use ripple_core::{ConnectionState, SyncError};
use ripple_realtime::testing::{FakeFeedClient, ScriptedAck};
use ripple_realtime::{
    ChannelHandlers, ConnectionConfig, ConnectionManager, MultiChannelCoordinator,
};

fn config(channel: &str, max_attempts: u32) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(channel, channel);
    config.max_reconnect_attempts = max_attempts;
    config.initial_reconnect_delay_ms = 100;
    config.join_timeout_ms = 1000;
    config
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(60)).await;
}

#[tokio::test(start_paused = true)]
async fn immediate_ack_connects_cleanly() {
    let feed = FakeFeedClient::new();
    feed.script("posts", [ScriptedAck::Ok]);
    let manager = ConnectionManager::builder(config("posts", 3))
        .client(feed.clone())
        .build();

    manager.subscribe();
    settle().await;

    let status = manager.connection_status();
    assert!(status.is_connected);
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(status.error, None);
}

#[tokio::test(start_paused = true)]
async fn one_failure_then_success_resets_attempts() {
    let feed = FakeFeedClient::new();
    feed.script("posts", [ScriptedAck::Error("socket reset"), ScriptedAck::Ok]);
    let manager = ConnectionManager::builder(config("posts", 3))
        .client(feed.clone())
        .build();

    manager.subscribe();
    settle().await;

    let status = manager.connection_status();
    assert!(status.is_connected);
    assert_eq!(status.reconnect_attempts, 0, "reset on the subscribed ack");
    assert_eq!(feed.subscribe_calls("posts"), 2, "one failure plus one retry");
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_end_in_terminal_erroring() {
    let feed = FakeFeedClient::new();
    feed.script_always_error("posts", "connection refused");
    let manager = ConnectionManager::builder(config("posts", 2))
        .client(feed.clone())
        .build();

    manager.subscribe();
    settle().await;

    let status = manager.connection_status();
    assert_eq!(status.state, ConnectionState::Erroring);
    assert_eq!(status.reconnect_attempts, 2);
    assert_eq!(feed.subscribe_calls("posts"), 3, "initial plus exactly 2 retries");
    assert!(
        status.error.unwrap().contains("Max reconnection attempts"),
        "terminal error names the exhausted budget"
    );

    // Terminal means no further attempts without an explicit reconnect.
    settle().await;
    assert_eq!(feed.subscribe_calls("posts"), 3);
}

#[tokio::test(start_paused = true)]
async fn two_channels_fail_independently() {
    let feed = FakeFeedClient::new();
    feed.script("posts", [ScriptedAck::Ok]);
    feed.script("failing", [ScriptedAck::ErrorAfterMs(50, "backend gone")]);

    let mut failing_config = config("failing", 3);
    failing_config.auto_reconnect = false;

    let coordinator = MultiChannelCoordinator::new();
    coordinator
        .add_channel(Arc::new(
            ConnectionManager::builder(config("posts", 3))
                .client(feed.clone())
                .build(),
        ))
        .unwrap();
    coordinator
        .add_channel(Arc::new(
            ConnectionManager::builder(failing_config)
                .client(feed.clone())
                .build(),
        ))
        .unwrap();

    let tagged: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = tagged.clone();
    coordinator.add_error_listener(Arc::new(move |channel, err| {
        sink.lock().push((channel.to_string(), err.to_string()));
    }));

    coordinator.subscribe_all();
    settle().await;

    let global = coordinator.global_status();
    assert_eq!(global.connected_channels, 1);
    assert_eq!(global.errored_channels, 1);
    assert!(!global.all_connected);
    assert!(global.has_errors);

    let tagged = tagged.lock();
    assert!(!tagged.is_empty());
    assert!(tagged.iter().all(|(channel, _)| channel == "failing"));
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_clears_terminal_state() {
    let feed = FakeFeedClient::new();
    feed.script_always_error("posts", "down");
    let terminal_errors = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = terminal_errors.clone();
    let manager = ConnectionManager::builder(config("posts", 1))
        .client(feed.clone())
        .handlers(ChannelHandlers::new().on_error(move |err| {
            if matches!(err, SyncError::MaxReconnectExceeded { .. }) {
                sink.lock().push(err.to_string());
            }
        }))
        .build();

    manager.subscribe();
    settle().await;
    assert_eq!(manager.connection_status().state, ConnectionState::Erroring);
    assert_eq!(terminal_errors.lock().len(), 1, "terminal error raised once");

    feed.script("posts", [ScriptedAck::Ok]);
    manager.reconnect();
    settle().await;

    let status = manager.connection_status();
    assert!(status.is_connected);
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(status.error, None);
    assert_eq!(terminal_errors.lock().len(), 1, "not raised again");
}

#[tokio::test(start_paused = true)]
async fn change_events_flow_only_while_subscribed() {
    let feed = FakeFeedClient::new();
    feed.script("posts", [ScriptedAck::Ok]);
    let inserts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = inserts.clone();
    let manager = ConnectionManager::builder(config("posts", 3))
        .client(feed.clone())
        .handlers(ChannelHandlers::new().on_insert(move |event| {
            if let Some(id) = event.entity_id() {
                sink.lock().push(id.into_inner());
            }
        }))
        .build();

    manager.subscribe();
    settle().await;
    let handle = feed.channel_handle("posts");
    handle.push_insert("p1", 1000);

    manager.unsubscribe();
    handle.push_insert("p2", 2000);

    assert_eq!(*inserts.lock(), vec!["p1".to_owned()]);
}
