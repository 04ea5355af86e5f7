//! Domain models - queue status types and the visitor flow
//!
//! This module contains the canonical data types used throughout the system:
//! - `QueueSnapshot` - aggregated wait times and congestion status
//! - `QueueEvent` - one timed leg reported by a visitor
//! - `VisitorFlowState` - position of a visitor in the two-queue flow
//! - `Daypart` - time-of-day bucket used to bias synthetic statistics

pub mod daypart;
pub mod flow;
pub mod types;

// Re-export commonly used types at module level
pub use daypart::Daypart;
pub use flow::{ActionCopy, FlowEffect, FlowStep, TimingSession, VisitorFlowState};
pub use types::{QueueEvent, QueueSnapshot, QueueStatus, Stage, StatusCopy, Thresholds};
