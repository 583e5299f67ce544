//! Dispatcher behavior: ordering, failure isolation and stop semantics.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use showrunner_core::EventKind;
use showrunner_runtime::{
    BackgroundTask, Caches, DispatchOutcome, DispatchTable, Dispatcher, EventQueue,
    LifecycleCoordinator,
};
use showrunner_testing::{Behavior, RecordingHandler, event, wait_until};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn dispatcher_with(queue: &EventQueue, kind: EventKind, handler: &RecordingHandler) -> Dispatcher {
    let table = DispatchTable::new().with(kind, Arc::new(handler.clone()));
    Dispatcher::new(queue.clone(), table, Caches::default())
        .with_poll_timeout(Duration::from_millis(20))
}

#[tokio::test]
async fn events_are_handled_in_enqueue_order() {
    let queue = EventQueue::new();
    let handler = RecordingHandler::default().with_delay(Duration::from_millis(1));
    let dispatcher = dispatcher_with(&queue, EventKind::ChatMessage, &handler);
    let stats = dispatcher.stats();

    for n in 0..50 {
        queue.push(event("chatMessage", json!({ "n": n })));
    }

    let mut coordinator = LifecycleCoordinator::new(Duration::from_secs(2));
    coordinator.register(Arc::new(dispatcher));
    coordinator.run().unwrap();

    assert!(wait_until(Duration::from_secs(10), || handler.calls() == 50).await);
    coordinator.stop().await;

    let order: Vec<i64> = handler
        .payloads()
        .iter()
        .map(|p| p["n"].as_i64().unwrap())
        .collect();
    assert_eq!(order, (0..50).collect::<Vec<_>>());
    assert_eq!(stats.handled(), 50);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn unknown_methods_are_unhandled_not_failed() {
    let queue = EventQueue::new();
    let handler = RecordingHandler::default();
    let dispatcher = dispatcher_with(&queue, EventKind::Tip, &handler);

    let unknown = dispatcher.dispatch(&event("spaceshipLanded", json!({}))).await;
    let unrouted = dispatcher.dispatch(&event("follow", json!({}))).await;

    assert_eq!(unknown, DispatchOutcome::Unhandled);
    assert_eq!(unrouted, DispatchOutcome::Unhandled);
    assert_eq!(dispatcher.stats().unhandled(), 2);
    assert_eq!(dispatcher.stats().failed(), 0);
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn handler_errors_and_panics_do_not_stop_the_pipeline() {
    let queue = EventQueue::new();
    let failing = RecordingHandler::new(Behavior::Fail);
    let panicking = RecordingHandler::new(Behavior::Panic);
    let declining = RecordingHandler::new(Behavior::Decline);
    let healthy = RecordingHandler::default();

    let table = DispatchTable::new()
        .with(EventKind::Tip, Arc::new(failing.clone()))
        .with(EventKind::Follow, Arc::new(panicking.clone()))
        .with(EventKind::Unfollow, Arc::new(declining.clone()))
        .with(EventKind::ChatMessage, Arc::new(healthy.clone()));
    let dispatcher = Dispatcher::new(queue.clone(), table, Caches::default())
        .with_poll_timeout(Duration::from_millis(20));
    let stats = dispatcher.stats();

    queue.push(event("tip", json!({})));
    queue.push(event("follow", json!({})));
    queue.push(event("unfollow", json!({})));
    queue.push(event("chatMessage", json!({})));

    let mut coordinator = LifecycleCoordinator::new(Duration::from_secs(2));
    coordinator.register(Arc::new(dispatcher));
    coordinator.run().unwrap();

    assert!(wait_until(Duration::from_secs(5), || healthy.calls() == 1).await);
    coordinator.stop().await;

    assert_eq!(failing.calls(), 1);
    assert_eq!(panicking.calls(), 1);
    assert_eq!(stats.failed(), 2);
    assert_eq!(stats.declined(), 1);
    assert_eq!(stats.handled(), 1);
}

#[tokio::test]
async fn handlers_see_the_snapshot_current_at_dispatch() {
    let queue = EventQueue::new();
    let handler = RecordingHandler::default();
    let caches = Caches::default();
    let table = DispatchTable::new().with(EventKind::UserEnter, Arc::new(handler.clone()));
    let dispatcher = Dispatcher::new(queue, table, caches.clone());

    dispatcher.dispatch(&event("userEnter", json!({}))).await;
    caches
        .vip
        .replace(HashMap::from([("bob".to_string(), "bob.mp3".to_string())]));
    dispatcher.dispatch(&event("userEnter", json!({}))).await;

    let seen = handler.snapshots();
    assert_eq!(seen[0].vip_audio("bob"), None);
    assert_eq!(seen[1].vip_audio("bob"), Some("bob.mp3"));
}

#[tokio::test]
async fn stop_lets_the_in_flight_event_finish_and_starts_no_other() {
    let queue = EventQueue::new();
    let handler = RecordingHandler::default().with_delay(Duration::from_millis(200));
    let dispatcher = dispatcher_with(&queue, EventKind::Tip, &handler);
    let stats = dispatcher.stats();

    for n in 0..5 {
        queue.push(event("tip", json!({ "n": n })));
    }

    let mut coordinator = LifecycleCoordinator::new(Duration::from_secs(2));
    coordinator.register(Arc::new(dispatcher));
    coordinator.run().unwrap();

    assert!(wait_until(Duration::from_secs(5), || handler.calls() == 1).await);
    let report = coordinator.stop().await;

    assert_eq!(report.joined, vec!["dispatcher".to_string()]);
    assert_eq!(handler.calls(), 1);
    assert_eq!(stats.handled(), 1);
    assert_eq!(queue.len(), 4);
}

#[tokio::test]
async fn dispatcher_exits_promptly_on_an_idle_queue() {
    let queue = EventQueue::new();
    let handler = RecordingHandler::default();
    let dispatcher = dispatcher_with(&queue, EventKind::Tip, &handler);
    let stop = showrunner_core::StopSignal::new();

    let run = tokio::spawn({
        let stop = stop.clone();
        async move { dispatcher.run(stop).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    stop.trigger();

    let exit = tokio::time::timeout(Duration::from_secs(2), run).await;
    assert!(exit.is_ok());
}

#[tokio::test]
async fn events_arriving_after_stop_stay_queued() {
    let queue = EventQueue::new();
    let handler = RecordingHandler::default();
    let dispatcher = dispatcher_with(&queue, EventKind::Tip, &handler)
        .with_poll_timeout(Duration::from_secs(1));
    let stop = showrunner_core::StopSignal::new();

    let run = tokio::spawn({
        let stop = stop.clone();
        async move { dispatcher.run(stop).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.trigger();
    queue.push(event("tip", json!({ "late": true })));

    let exit = tokio::time::timeout(Duration::from_secs(2), run).await;
    assert!(exit.is_ok());
    assert_eq!(handler.calls(), 0);
    assert_eq!(queue.len(), 1);
}
