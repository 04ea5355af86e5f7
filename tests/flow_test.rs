//! End-to-end tests: tracker to sink, and the HTTP service

use async_trait::async_trait;
use ru_monitor::domain::{QueueEvent, QueueSnapshot, Stage, Thresholds, VisitorFlowState};
use ru_monitor::infra::Metrics;
use ru_monitor::io::{serve, AppState, FileEventSink};
use ru_monitor::services::refresh::RefreshTrigger;
use ru_monitor::services::{
    create_event_worker, create_refresh_loop, Estimator, EventSink, MockStatsSource, Tracker,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio::sync::watch;

struct OfflineSink;

#[async_trait]
impl EventSink for OfflineSink {
    async fn submit_queue_event(&self, _event: &QueueEvent) -> anyhow::Result<()> {
        anyhow::bail!("backend offline")
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

#[tokio::test]
async fn test_visit_is_written_to_jsonl() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let metrics = Arc::new(Metrics::new());
    let (event_tx, worker) =
        create_event_worker(Arc::new(FileEventSink::new(&path)), metrics.clone(), 16, 180.0);
    let (mut tracker, _state_rx) = Tracker::new(event_tx, metrics.clone());

    let base = Instant::now();
    for (i, offset_secs) in [0u64, 240, 300, 420, 430].iter().enumerate() {
        let transition = tracker.advance_at(base + Duration::from_secs(*offset_secs));
        assert_eq!(transition.from.advance().next, transition.to, "step {i}");
    }
    assert_eq!(tracker.state(), VisitorFlowState::Idle);

    drop(tracker);
    worker.run().await;

    let content = std::fs::read_to_string(&path).unwrap();
    let events: Vec<QueueEvent> =
        content.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].stage, Stage::Cashier);
    assert_eq!(events[0].duration_minutes, 4.0);
    assert_eq!(events[1].stage, Stage::Access);
    assert_eq!(events[1].duration_minutes, 2.0);
    assert_eq!(events[0].session_id, events[1].session_id);
    assert_eq!(metrics.events_submitted(), 2);
}

#[tokio::test]
async fn test_sink_failure_does_not_touch_tracker() {
    let metrics = Arc::new(Metrics::new());
    let (event_tx, worker) = create_event_worker(Arc::new(OfflineSink), metrics.clone(), 16, 180.0);
    let worker_handle = tokio::spawn(worker.run());
    let (mut tracker, state_rx) = Tracker::new(event_tx, metrics.clone());

    let base = Instant::now();
    tracker.advance_at(base);
    tracker.advance_at(base + Duration::from_secs(90));
    tracker.advance_at(base + Duration::from_secs(100));
    assert_eq!(tracker.state(), VisitorFlowState::InAccessQueue);
    assert_eq!(*state_rx.borrow(), VisitorFlowState::InAccessQueue);
    assert!(tracker.started_at().is_some());

    drop(tracker);
    worker_handle.await.unwrap();
    assert_eq!(metrics.events_submit_failed(), 1);
    assert_eq!(metrics.events_submitted(), 0);
}

#[tokio::test]
async fn test_http_service_round_trip() {
    let metrics = Arc::new(Metrics::new());
    let dir = tempdir().unwrap();
    let path = dir.path().join("intake.jsonl");
    let (event_tx, worker) =
        create_event_worker(Arc::new(FileEventSink::new(&path)), metrics.clone(), 16, 180.0);
    let worker_handle = tokio::spawn(worker.run());

    let source = Arc::new(MockStatsSource::new(
        Estimator::with_seed(Thresholds::default(), 11),
        Duration::ZERO,
    ));
    let (_visitor_tx, visitor_rx) = watch::channel(VisitorFlowState::Idle);
    let (_handle, refresh_loop, board_rx) =
        create_refresh_loop(source, visitor_rx, Duration::from_secs(60), metrics.clone());
    refresh_loop.refresh(RefreshTrigger::Startup).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let state = Arc::new(AppState {
        site_id: "ru-test".to_string(),
        metrics: metrics.clone(),
        board_rx,
        event_tx,
        max_valid_minutes: 180.0,
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(serve(listener, state, shutdown_rx));

    let client = reqwest::Client::new();

    let health = client.get(format!("{base_url}/health")).send().await.unwrap();
    assert_eq!(health.status().as_u16(), 200);

    let snapshot: QueueSnapshot =
        client.get(format!("{base_url}/stats")).send().await.unwrap().json().await.unwrap();
    assert_eq!(
        snapshot.total_wait_minutes,
        snapshot.cashier_wait_minutes + snapshot.turnstile_wait_minutes
    );

    let accepted = client
        .post(format!("{base_url}/events"))
        .body(r#"{"stage":"access","duration_minutes":2.5}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status().as_u16(), 202);

    let rejected = client
        .post(format!("{base_url}/events"))
        .body(r#"{"stage":"access","duration_minutes":999}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status().as_u16(), 400);

    let missing = client.get(format!("{base_url}/nope")).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    let body = client.get(format!("{base_url}/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(body.contains("ru_stats_fetch_total{site=\"ru-test\"} 1"));
    assert!(body.contains("ru_queue_events_discarded_total{site=\"ru-test\"} 1"));

    shutdown_tx.send_replace(true);
    server.await.unwrap().unwrap();

    // The client still holds a keep-alive connection; the worker must see the
    // channel close once the server is gone
    tokio::time::timeout(Duration::from_millis(500), worker_handle).await.unwrap().unwrap();
    drop(client);
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains("\"access\""));
}
