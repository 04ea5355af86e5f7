//! Visitor progress tracking
//!
//! The Tracker owns one visitor's flow through the cashier and turnstile
//! queues. It is driven by two intents:
//! - `advance` - the single "next step" tap, defined for every state
//! - `cancel` - escape hatch back to idle, no-op outside the timed flow
//!
//! Every transition is published on a `watch` channel. Each completed leg is
//! pushed onto a bounded `mpsc` channel for the submission worker; a full or
//! closed channel never blocks or reverts the transition.


use crate::domain::flow::{FlowEffect, TimingSession, VisitorFlowState};
use crate::domain::types::{new_uuid_v7, QueueEvent, Stage};
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Outcome of a single `advance` or `cancel`
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: VisitorFlowState,
    pub to: VisitorFlowState,
    /// Leg reported by this transition, if it closed one
    pub event: Option<QueueEvent>,
    /// The leg made it onto the event channel
    pub queued: bool,
}

pub struct Tracker {
    state: VisitorFlowState,
    timing: TimingSession,
    /// Shared by both legs of one visit, rolled on every new visit
    session_id: String,
    state_tx: watch::Sender<VisitorFlowState>,
    event_tx: mpsc::Sender<QueueEvent>,
    metrics: Arc<Metrics>,
}

impl Tracker {
    /// Create an idle tracker; the returned receiver observes every transition
    pub fn new(
        event_tx: mpsc::Sender<QueueEvent>,
        metrics: Arc<Metrics>,
    ) -> (Self, watch::Receiver<VisitorFlowState>) {
        let (state_tx, state_rx) = watch::channel(VisitorFlowState::Idle);
        let tracker = Self {
            state: VisitorFlowState::Idle,
            timing: TimingSession::new(),
            session_id: new_uuid_v7(),
            state_tx,
            event_tx,
            metrics,
        };
        (tracker, state_rx)
    }

    #[inline]
    pub fn state(&self) -> VisitorFlowState {
        self.state
    }

    /// Start instant of the open timing session
    #[inline]
    pub fn started_at(&self) -> Option<Instant> {
        self.timing.start()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Another observer for state changes
    pub fn subscribe(&self) -> watch::Receiver<VisitorFlowState> {
        self.state_tx.subscribe()
    }

    /// Elapsed time of the open leg, truncated to whole seconds
    pub fn elapsed_at(&self, now: Instant) -> Option<Duration> {
        self.timing.elapsed_at(now)
    }

    pub fn advance(&mut self) -> Transition {
        self.advance_at(Instant::now())
    }

    /// Apply the advance action as of `now`
    pub fn advance_at(&mut self, now: Instant) -> Transition {
        let from = self.state;
        let step = from.advance();

        let (event, queued) = match step.effect {
            FlowEffect::StartTiming => {
                if from == VisitorFlowState::Idle {
                    self.session_id = new_uuid_v7();
                }
                self.timing.open(now);
                (None, false)
            }
            FlowEffect::StopTiming(stage) => match self.close_leg(stage, now) {
                Some((event, queued)) => (Some(event), queued),
                None => (None, false),
            },
            FlowEffect::Reset => {
                self.timing.close();
                (None, false)
            }
        };

        if step.next == VisitorFlowState::Completed {
            self.metrics.record_visit_completed();
        }

        self.set_state(step.next);
        Transition { from, to: step.next, event, queued }
    }

    /// Abandon the current visit without reporting anything
    ///
    /// Returns `None` when there is nothing to cancel.
    pub fn cancel(&mut self) -> Option<Transition> {
        let from = self.state;
        if !from.is_cancellable() {
            debug!(state = %from, "visitor_cancel_ignored");
            return None;
        }

        self.timing.close();
        self.metrics.record_cancellation();
        info!(state = %from, session_id = %self.session_id, "visitor_cancelled");

        self.set_state(VisitorFlowState::Idle);
        Some(Transition { from, to: VisitorFlowState::Idle, event: None, queued: false })
    }

    /// Close the open leg and hand it to the worker; the flag says whether it was queued
    fn close_leg(&mut self, stage: Stage, now: Instant) -> Option<(QueueEvent, bool)> {
        let start = self.timing.close()?;
        let duration_ms = now.saturating_duration_since(start).as_millis();
        let duration_minutes = duration_ms as f64 / 60_000.0;

        let event = QueueEvent::new(stage, duration_minutes, &self.session_id);
        self.metrics.record_leg(stage, duration_minutes);

        info!(
            stage = %stage,
            duration_ms = %duration_ms,
            session_id = %self.session_id,
            "visitor_leg_timed"
        );

        let queued = match self.event_tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.metrics.record_event_dropped();
                warn!(stage = %stage, "queue_event_dropped_channel_full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.record_event_dropped();
                warn!(stage = %stage, "queue_event_dropped_channel_closed");
                false
            }
        };

        Some((event, queued))
    }

    fn set_state(&mut self, next: VisitorFlowState) {
        let prev = self.state;
        self.state = next;
        debug_assert_eq!(self.timing.is_open(), next.is_timed());
        // Receivers may all be gone (headless use); the state is still ours
        self.state_tx.send_replace(next);
        debug!(from = %prev, to = %next, "visitor_state_changed");
    }
}
