//! Visitor flow through the cashier and turnstile queues
//!
//! The flow is strictly linear: every state has exactly one successor on
//! `advance`. `cancel` is the only way to skip back to `Idle`.

use crate::domain::types::Stage;
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitorFlowState {
    Idle,
    InCashierQueue,
    BetweenQueues,
    InAccessQueue,
    Completed,
}

/// Side effect attached to a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEffect {
    /// Open a timing session
    StartTiming,
    /// Close the timing session and report the leg
    StopTiming(Stage),
    /// Back to the start, nothing to time
    Reset,
}

/// Result of applying `advance` to a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStep {
    pub next: VisitorFlowState,
    pub effect: FlowEffect,
}

impl VisitorFlowState {
    /// Transition table for the advance action
    pub fn advance(self) -> FlowStep {
        use FlowEffect::*;
        use VisitorFlowState::*;

        let (next, effect) = match self {
            Idle => (InCashierQueue, StartTiming),
            InCashierQueue => (BetweenQueues, StopTiming(Stage::Cashier)),
            BetweenQueues => (InAccessQueue, StartTiming),
            InAccessQueue => (Completed, StopTiming(Stage::Access)),
            Completed => (Idle, Reset),
        };
        FlowStep { next, effect }
    }

    /// States in which a timing session must be open
    #[inline]
    pub fn is_timed(&self) -> bool {
        matches!(self, VisitorFlowState::InCashierQueue | VisitorFlowState::InAccessQueue)
    }

    /// States from which cancel returns to idle
    #[inline]
    pub fn is_cancellable(&self) -> bool {
        !matches!(self, VisitorFlowState::Idle | VisitorFlowState::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitorFlowState::Idle => "idle",
            VisitorFlowState::InCashierQueue => "in_cashier_queue",
            VisitorFlowState::BetweenQueues => "between_queues",
            VisitorFlowState::InAccessQueue => "in_access_queue",
            VisitorFlowState::Completed => "completed",
        }
    }

    /// Label and hint for the single action button
    ///
    /// `elapsed_secs` is only shown while a leg is being timed.
    pub fn action_copy(&self, elapsed_secs: u64) -> ActionCopy {
        let (text, sub) = match self {
            VisitorFlowState::Idle => {
                ("Cheguei na Fila do Caixa", "Toque para começar a marcar".to_string())
            }
            VisitorFlowState::InCashierQueue => {
                ("Paguei / Saí do Caixa", format!("Na fila há: {}", format_elapsed(elapsed_secs)))
            }
            VisitorFlowState::BetweenQueues => {
                ("Entrei na Fila da Catraca", "Toque assim que entrar".to_string())
            }
            VisitorFlowState::InAccessQueue => {
                ("Passei na Catraca", format!("Na fila há: {}", format_elapsed(elapsed_secs)))
            }
            VisitorFlowState::Completed => {
                ("Obrigado por ajudar!", "Toque para voltar ao início".to_string())
            }
        };
        ActionCopy { text, sub }
    }
}

/// Button copy for one flow state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCopy {
    pub text: &'static str,
    pub sub: String,
}

impl std::fmt::Display for VisitorFlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start instant of the leg currently being timed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingSession {
    start: Option<Instant>,
}

impl TimingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, now: Instant) {
        self.start = Some(now);
    }

    /// Close the session, returning the start instant if one was open
    pub fn close(&mut self) -> Option<Instant> {
        self.start.take()
    }

    #[inline]
    pub fn start(&self) -> Option<Instant> {
        self.start
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.start.is_some()
    }

    /// Elapsed time truncated to whole seconds
    pub fn elapsed_at(&self, now: Instant) -> Option<Duration> {
        self.start.map(|start| Duration::from_secs(now.saturating_duration_since(start).as_secs()))
    }
}

/// Format whole seconds as `m:ss`
pub fn format_elapsed(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
