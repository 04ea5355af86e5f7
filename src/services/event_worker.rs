//! Queue event worker - submits timed legs off the tracker's path
//!
//! The tracker enqueues each completed leg with `try_send` and moves on.
//! This worker drains the channel, drops implausible durations, and hands
//! the rest to the configured sink. A failed submission is logged and
//! counted; the visitor's flow is never affected.

use crate::domain::types::QueueEvent;
use crate::infra::metrics::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Destination for completed queue legs
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn submit_queue_event(&self, event: &QueueEvent) -> anyhow::Result<()>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Worker that forwards queue events to a sink
pub struct QueueEventWorker {
    sink: Arc<dyn EventSink>,
    event_rx: mpsc::Receiver<QueueEvent>,
    metrics: Arc<Metrics>,
    /// Legs longer than this (minutes) are treated as abandoned sessions
    max_valid_minutes: f64,
}

impl QueueEventWorker {
    pub fn new(
        sink: Arc<dyn EventSink>,
        event_rx: mpsc::Receiver<QueueEvent>,
        metrics: Arc<Metrics>,
        max_valid_minutes: f64,
    ) -> Self {
        Self { sink, event_rx, metrics, max_valid_minutes }
    }

    /// Validate and submit one event
    pub async fn process(&self, event: &QueueEvent) {
        if !event.is_plausible(self.max_valid_minutes) {
            self.metrics.record_event_discarded();
            warn!(
                stage = %event.stage,
                duration_min = format!("{:.2}", event.duration_minutes),
                max_valid_min = %self.max_valid_minutes,
                session_id = %event.session_id,
                "queue_event_discarded"
            );
            return;
        }

        let submit_start = Instant::now();
        match self.sink.submit_queue_event(event).await {
            Ok(()) => {
                self.metrics.record_event_submitted();
                info!(
                    sink = %self.sink.name(),
                    stage = %event.stage,
                    duration_min = format!("{:.2}", event.duration_minutes),
                    session_id = %event.session_id,
                    submit_ms = %submit_start.elapsed().as_millis(),
                    "queue_event_submitted"
                );
            }
            Err(e) => {
                self.metrics.record_event_submit_failed();
                warn!(
                    sink = %self.sink.name(),
                    stage = %event.stage,
                    session_id = %event.session_id,
                    error = %format!("{e:#}"),
                    "queue_event_submit_failed"
                );
            }
        }
    }

    /// Run until every sender is dropped
    pub async fn run(mut self) {
        info!(sink = %self.sink.name(), "queue_event_worker_started");

        while let Some(event) = self.event_rx.recv().await {
            self.process(&event).await;
        }

        info!("queue_event_worker_stopped");
    }
}

/// Create a queue event channel and worker
///
/// Returns the sender (for trackers and the HTTP intake) and the worker (to be spawned)
pub fn create_event_worker(
    sink: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
    max_valid_minutes: f64,
) -> (mpsc::Sender<QueueEvent>, QueueEventWorker) {
    let (event_tx, event_rx) = mpsc::channel(buffer_size.max(1));
    let worker = QueueEventWorker::new(sink, event_rx, metrics, max_valid_minutes);
    (event_tx, worker)
}
