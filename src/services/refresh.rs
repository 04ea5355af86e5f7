//! Status board refresh loop
//!
//! Keeps the last-known snapshot for the presentation layer and polls the
//! stats source on a fixed interval. Interval polls only fire while the
//! visitor is `Idle`; `BetweenQueues` and `Completed` suppress them too.
//! Every visitor state change fetches once and restarts the interval.
//! Manual refresh requests always fetch.

use crate::domain::flow::VisitorFlowState;
use crate::domain::types::QueueSnapshot;
use crate::infra::metrics::Metrics;
use crate::services::estimator::StatsSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What the presentation layer renders
#[derive(Debug, Clone, Default)]
pub struct BoardState {
    /// Last successfully fetched snapshot
    pub snapshot: Option<QueueSnapshot>,
    /// A fetch is in flight
    pub loading: bool,
    pub last_updated: Option<Instant>,
    /// Error of the most recent fetch, cleared on success
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Startup,
    Interval,
    StateChange,
    Manual,
}

impl RefreshTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTrigger::Startup => "startup",
            RefreshTrigger::Interval => "interval",
            RefreshTrigger::StateChange => "state_change",
            RefreshTrigger::Manual => "manual",
        }
    }
}

/// Automatic refreshes only run while the visitor is idle
#[inline]
pub fn auto_refresh_allowed(visitor: VisitorFlowState) -> bool {
    visitor == VisitorFlowState::Idle
}

/// Sender side for manual refresh requests
#[derive(Clone)]
pub struct RefreshHandle {
    manual_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Ask for a refresh; coalesced with any request already queued
    pub fn request(&self) {
        let _ = self.manual_tx.try_send(());
    }
}

pub struct RefreshLoop {
    source: Arc<dyn StatsSource>,
    board_tx: watch::Sender<BoardState>,
    visitor_rx: watch::Receiver<VisitorFlowState>,
    manual_rx: mpsc::Receiver<()>,
    interval: Duration,
    metrics: Arc<Metrics>,
}

/// Create the refresh loop, its manual trigger and the board observer
///
/// Returns the handle (for the UI), the loop (to be spawned) and the board receiver
pub fn create_refresh_loop(
    source: Arc<dyn StatsSource>,
    visitor_rx: watch::Receiver<VisitorFlowState>,
    interval: Duration,
    metrics: Arc<Metrics>,
) -> (RefreshHandle, RefreshLoop, watch::Receiver<BoardState>) {
    let (board_tx, board_rx) = watch::channel(BoardState::default());
    let (manual_tx, manual_rx) = mpsc::channel(1);
    let refresh_loop = RefreshLoop {
        source,
        board_tx,
        visitor_rx,
        manual_rx,
        interval: interval.max(Duration::from_millis(1)),
        metrics,
    };
    (RefreshHandle { manual_tx }, refresh_loop, board_rx)
}

impl RefreshLoop {
    /// Fetch once and publish the outcome
    pub async fn refresh(&self, trigger: RefreshTrigger) {
        self.board_tx.send_modify(|board| board.loading = true);

        let start = Instant::now();
        let result = self.source.fetch_queue_stats().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(snapshot) => {
                self.metrics.record_fetch_ok(latency_ms, &snapshot);
                info!(
                    trigger = %trigger.as_str(),
                    status = %snapshot.status,
                    total_wait_min = format!("{:.1}", snapshot.total_wait_minutes),
                    contributors = %snapshot.active_contributors,
                    latency_ms = %latency_ms,
                    "queue_snapshot_loaded"
                );
                self.board_tx.send_modify(|board| {
                    board.snapshot = Some(snapshot);
                    board.loading = false;
                    board.last_updated = Some(Instant::now());
                    board.last_error = None;
                });
            }
            Err(e) => {
                self.metrics.record_fetch_failed(latency_ms);
                warn!(
                    trigger = %trigger.as_str(),
                    error = %format!("{e:#}"),
                    latency_ms = %latency_ms,
                    "stats_fetch_failed"
                );
                // Last-known snapshot stays on the board
                self.board_tx.send_modify(|board| {
                    board.loading = false;
                    board.last_error = Some(format!("{e:#}"));
                });
            }
        }
    }

    /// Run until shutdown is signalled
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = %self.interval.as_millis(), "refresh_loop_started");
        self.refresh(RefreshTrigger::Startup).await;

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut manual_open = true;
        let mut visitor_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let visitor = *self.visitor_rx.borrow();
                    if auto_refresh_allowed(visitor) {
                        self.refresh(RefreshTrigger::Interval).await;
                    } else {
                        self.metrics.record_refresh_suppressed();
                        debug!(visitor_state = %visitor, "auto_refresh_suppressed");
                    }
                }
                result = self.visitor_rx.changed(), if visitor_open => {
                    if result.is_err() {
                        visitor_open = false;
                        continue;
                    }
                    let visitor = *self.visitor_rx.borrow_and_update();
                    debug!(visitor_state = %visitor, "visitor_state_refresh");
                    self.refresh(RefreshTrigger::StateChange).await;
                    ticker.reset();
                }
                request = self.manual_rx.recv(), if manual_open => {
                    match request {
                        Some(()) => self.refresh(RefreshTrigger::Manual).await,
                        None => manual_open = false,
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("refresh_loop_stopped");
    }
}
