//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `adapters` - Stats source and event sink selection from config
//! - `egress` - Queue event output to log or file (JSONL format)
//! - `http_client` - HTTP stats source and event sink for a remote backend
//! - `server` - HTTP service: snapshot, event intake, Prometheus metrics

pub mod adapters;
pub mod egress;
pub mod http_client;
pub mod server;

// Re-export commonly used types
pub use adapters::{event_sink_from_config, stats_source_from_config};
pub use egress::{FileEventSink, LogEventSink};
pub use http_client::{HttpEventSink, HttpStatsSource};
pub use server::{serve, start_server, AppState};
