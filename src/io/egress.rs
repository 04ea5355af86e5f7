//! Queue event egress - local sinks for completed legs
//!
//! `FileEventSink` appends events in JSONL format (one JSON object per line)
//! to the file specified in config. `LogEventSink` only logs, matching the
//! backend-less deployment.

use crate::domain::types::QueueEvent;
use crate::services::event_worker::EventSink;
use anyhow::Context;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sink that records the event in the log and nothing else
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn submit_queue_event(&self, event: &QueueEvent) -> anyhow::Result<()> {
        info!(
            stage = %event.stage,
            duration_min = format!("{:.2}", event.duration_minutes),
            session_id = %event.session_id,
            recorded_at = %event.recorded_at,
            "queue_event_received"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Sink that appends events to a JSONL file
pub struct FileEventSink {
    file_path: PathBuf,
}

impl FileEventSink {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        info!(file_path = %file_path.display(), "event_file_sink_initialized");
        Self { file_path }
    }

    fn append_line(&self, line: &str) -> anyhow::Result<()> {
        let path = self.file_path.as_path();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        writeln!(file, "{line}").with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(file = %path.display(), bytes = %line.len(), "event_line_written");

        Ok(())
    }
}

#[async_trait]
impl EventSink for FileEventSink {
    async fn submit_queue_event(&self, event: &QueueEvent) -> anyhow::Result<()> {
        let json = serde_json::to_string(event).context("Failed to serialize queue event")?;
        self.append_line(&json)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
