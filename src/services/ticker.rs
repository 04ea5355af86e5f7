//! One-second cadence for the elapsed-time display
//!
//! The UI polls far more often than once a second; the ticker decides when
//! the elapsed value is worth redrawing. It is keyed on the session start so
//! a new leg re-arms it and a closed session disarms it.

use std::time::{Duration, Instant};

const CADENCE: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct DisplayTicker {
    /// Start of the session being displayed
    armed_for: Option<Instant>,
    last_emit: Option<Instant>,
}

impl DisplayTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Elapsed floor seconds if a redraw is due
    ///
    /// Emits immediately for a new session, then at most once per second.
    pub fn poll(&mut self, start: Option<Instant>, now: Instant) -> Option<u64> {
        let Some(start) = start else {
            self.disarm();
            return None;
        };

        let due = match (self.armed_for, self.last_emit) {
            (Some(armed), Some(last)) if armed == start => {
                now.saturating_duration_since(last) >= CADENCE
            }
            _ => true,
        };
        if !due {
            return None;
        }

        self.armed_for = Some(start);
        self.last_emit = Some(now);
        Some(now.saturating_duration_since(start).as_secs())
    }

    pub fn disarm(&mut self) {
        self.armed_for = None;
        self.last_emit = None;
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed_for.is_some()
    }
}
