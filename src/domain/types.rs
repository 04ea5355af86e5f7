//! Shared types for the queue monitor

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Tri-state congestion classification plus "not enough data"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Green,
    Yellow,
    Red,
    Unknown,
}

/// Display copy attached to a status (headline and subtext)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCopy {
    pub text: &'static str,
    pub subtext: &'static str,
}

impl QueueStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Green => "GREEN",
            QueueStatus::Yellow => "YELLOW",
            QueueStatus::Red => "RED",
            QueueStatus::Unknown => "UNKNOWN",
        }
    }

    /// Short message carried inside every snapshot
    pub fn message(&self) -> &'static str {
        match self {
            QueueStatus::Green => "Melhor horário!",
            QueueStatus::Yellow => "Fluxo moderado.",
            QueueStatus::Red => "Fila intensa.",
            QueueStatus::Unknown => "Dados insuficientes.",
        }
    }

    /// Headline and subtext shown on the status card
    pub fn copy(&self) -> StatusCopy {
        match self {
            QueueStatus::Green => StatusCopy {
                text: "Fila tranquila!",
                subtext: "Ótimo momento para ir ao RU.",
            },
            QueueStatus::Yellow => StatusCopy {
                text: "Movimento moderado.",
                subtext: "Tempo de espera aceitável.",
            },
            QueueStatus::Red => StatusCopy {
                text: "Fila grande!",
                subtext: "Se puder, espere um pouco.",
            },
            QueueStatus::Unknown => StatusCopy {
                text: "Aguardando dados...",
                subtext: "Precisamos de mais colaboradores.",
            },
        }
    }

    /// Numeric gauge value for Prometheus (0=unknown, 1=green, 2=yellow, 3=red)
    pub fn gauge_value(&self) -> u64 {
        match self {
            QueueStatus::Unknown => 0,
            QueueStatus::Green => 1,
            QueueStatus::Yellow => 2,
            QueueStatus::Red => 3,
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification thresholds; both comparisons are strict
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Below this many contributors the status is `Unknown`
    pub min_contributors: u32,
    /// Total wait above this is at least `Yellow`
    pub yellow_minutes: f64,
    /// Total wait above this is `Red`
    pub red_minutes: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { min_contributors: 10, yellow_minutes: 10.0, red_minutes: 20.0 }
    }
}

impl Thresholds {
    pub fn classify(&self, total_wait_minutes: f64, active_contributors: u32) -> QueueStatus {
        if active_contributors < self.min_contributors {
            QueueStatus::Unknown
        } else if total_wait_minutes > self.red_minutes {
            QueueStatus::Red
        } else if total_wait_minutes > self.yellow_minutes {
            QueueStatus::Yellow
        } else {
            QueueStatus::Green
        }
    }
}

/// Aggregated view of the cafeteria queues at one moment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub cashier_wait_minutes: f64,
    pub turnstile_wait_minutes: f64,
    pub total_wait_minutes: f64,
    pub active_contributors: u32,
    pub status: QueueStatus,
    pub message: String,
}

impl QueueSnapshot {
    /// Total wait rounded to whole minutes, `None` when the status carries no data
    pub fn display_total_minutes(&self) -> Option<u64> {
        match self.status {
            QueueStatus::Unknown => None,
            _ => Some(self.total_wait_minutes.max(0.0).round() as u64),
        }
    }
}

/// Which leg of the visit a timing belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Queue in front of the cashier
    Cashier,
    /// Queue in front of the turnstile
    Access,
}

impl Stage {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Cashier => "cashier",
            Stage::Access => "access",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed leg reported by a visitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEvent {
    pub stage: Stage,
    pub duration_minutes: f64,
    /// Shared by both legs of one visit
    #[serde(default)]
    pub session_id: String,
    /// Epoch ms at which the leg was closed
    #[serde(default)]
    pub recorded_at: u64,
}

impl QueueEvent {
    pub fn new(stage: Stage, duration_minutes: f64, session_id: &str) -> Self {
        Self {
            stage,
            duration_minutes,
            session_id: session_id.to_string(),
            recorded_at: epoch_ms(),
        }
    }

    /// Check the reported duration is a plausible wait
    pub fn is_plausible(&self, max_minutes: f64) -> bool {
        self.duration_minutes.is_finite()
            && self.duration_minutes >= 0.0
            && self.duration_minutes <= max_minutes
    }
}
