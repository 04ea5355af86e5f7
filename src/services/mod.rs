//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `estimator` - Synthetic queue statistics and the `StatsSource` seam
//! - `tracker` - Visitor flow state machine and leg timing
//! - `event_worker` - Async queue event submission
//! - `refresh` - Status board refresh loop
//! - `ticker` - One-second elapsed display cadence
//! - `admin` - Hidden admin panel unlock

pub mod admin;
pub mod estimator;
pub mod event_worker;
pub mod refresh;
pub mod ticker;
pub mod tracker;

// Re-export commonly used types
pub use admin::AdminUnlock;
pub use estimator::{Estimator, MockStatsSource, StatsSource};
pub use event_worker::{create_event_worker, EventSink, QueueEventWorker};
pub use refresh::{create_refresh_loop, BoardState, RefreshHandle, RefreshLoop};
pub use ticker::DisplayTicker;
pub use tracker::{Tracker, Transition};
