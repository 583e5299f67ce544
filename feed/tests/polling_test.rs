//! Polling source against a mock events API.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use showrunner_core::{EventKind, SourceError, SourceFactory};
use showrunner_feed::PollingSourceFactory;
use showrunner_runtime::{Caches, DispatchTable, Dispatcher, EventQueue, IngestionLoop, LifecycleCoordinator};
use showrunner_testing::{RecordingHandler, wait_until};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page(events: serde_json::Value, next_url: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "events": events, "nextUrl": next_url }))
}

#[tokio::test]
async fn follows_the_cursor_between_polls() {
    let server = MockServer::start().await;
    let second = format!("{}/events/2", server.uri());
    Mock::given(method("GET"))
        .and(path("/events/1"))
        .respond_with(page(
            json!([
                {"method": "tip", "object": {"tip": {"tokens": 10}}, "id": "e1"},
                {"method": "follow", "object": {}}
            ]),
            &second,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events/2"))
        .respond_with(page(json!([{"method": "userLeave", "object": {}, "id": "e3"}]), &second))
        .mount(&server)
        .await;

    let factory = PollingSourceFactory::new(format!("{}/events/1", server.uri()), 1000).unwrap();
    let mut source = factory.open().await.unwrap();

    let first = source.next_batch().await.unwrap();
    let methods: Vec<_> = first.iter().map(|e| e.method().to_string()).collect();
    assert_eq!(methods, vec!["tip", "follow"]);
    assert_eq!(first[0].source_id(), "e1");
    assert_eq!(first[1].source_id(), format!("{}/events/1#1", server.uri()));

    let next = source.next_batch().await.unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].method(), "userLeave");
    assert_eq!(source.pause(), Some(Duration::from_millis(600)));
}

#[tokio::test]
async fn non_200_keeps_the_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(page(json!([{"method": "tip", "object": {}}]), &format!("{}/events", server.uri())))
        .mount(&server)
        .await;

    let url = format!("{}/events", server.uri());
    let factory = PollingSourceFactory::new(url.clone(), 1000).unwrap();
    let mut source = factory.open().await.unwrap();

    let failed = source.next_batch().await;
    assert_eq!(
        failed,
        Err(SourceError::Status {
            status: 503,
            url: url.clone()
        })
    );

    let retried = source.next_batch().await.unwrap();
    assert_eq!(retried.len(), 1);
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let factory = PollingSourceFactory::new(server.uri(), 1000).unwrap();
    let mut source = factory.open().await.unwrap();

    assert!(matches!(source.next_batch().await, Err(SourceError::Decode(_))));
}

#[tokio::test]
async fn unreachable_api_is_a_transport_error() {
    let factory = PollingSourceFactory::new("http://127.0.0.1:9/events", 1000).unwrap();
    let mut source = factory.open().await.unwrap();

    assert!(matches!(source.next_batch().await, Err(SourceError::Transport(_))));
}

#[tokio::test]
async fn event_after_a_503_is_enqueued_and_processed() {
    let server = MockServer::start().await;
    let next = format!("{}/events/next", server.uri());
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(page(json!([{"method": "tip", "object": {"tip": {"tokens": 100}}}]), &next))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events/next"))
        .respond_with(page(json!([]), &next))
        .mount(&server)
        .await;

    let factory = PollingSourceFactory::new(format!("{}/events", server.uri()), 1000)
        .unwrap()
        .with_interval(Duration::from_millis(20));
    let queue = EventQueue::new();
    let handler = RecordingHandler::default();
    let dispatcher = Dispatcher::new(
        queue.clone(),
        DispatchTable::new().with(EventKind::Tip, Arc::new(handler.clone())),
        Caches::default(),
    )
    .with_poll_timeout(Duration::from_millis(20));
    let ingest = IngestionLoop::new(Arc::new(factory), queue.clone());

    let mut coordinator = LifecycleCoordinator::new(Duration::from_secs(2));
    coordinator.register(Arc::new(ingest));
    coordinator.register(Arc::new(dispatcher));
    coordinator.run().unwrap();

    assert!(wait_until(Duration::from_secs(5), || handler.calls() == 1).await);
    coordinator.stop().await;

    assert_eq!(handler.payloads()[0]["tip"]["tokens"], 100);
    let requests = server.received_requests().await.unwrap();
    assert!(requests.len() >= 2);
    assert_eq!(requests[0].url.path(), "/events");
    assert_eq!(requests[1].url.path(), "/events");
}
