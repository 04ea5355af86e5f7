//! HTTP clients for a queue statistics backend
//!
//! One `reqwest::Client` per adapter, built once for connection pooling,
//! with the request timeout taken from config.

use crate::domain::types::{QueueEvent, QueueSnapshot};
use crate::infra::config::Config;
use crate::services::estimator::StatsSource;
use crate::services::event_worker::EventSink;
use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ru-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// `StatsSource` that GETs a `QueueSnapshot` JSON document
pub struct HttpStatsSource {
    client: reqwest::Client,
    url: String,
}

impl HttpStatsSource {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self { client: build_client(timeout)?, url: url.to_string() })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config.stats_http_url(), Duration::from_millis(config.stats_timeout_ms()))
    }
}

#[async_trait]
impl StatsSource for HttpStatsSource {
    async fn fetch_queue_stats(&self) -> anyhow::Result<QueueSnapshot> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", self.url))?;

        let snapshot: QueueSnapshot = response
            .json()
            .await
            .with_context(|| format!("Invalid snapshot from {}", self.url))?;

        debug!(url = %self.url, status = %snapshot.status, "http_snapshot_fetched");
        Ok(snapshot)
    }
}

/// `EventSink` that POSTs each event as JSON
pub struct HttpEventSink {
    client: reqwest::Client,
    url: String,
}

impl HttpEventSink {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self { client: build_client(timeout)?, url: url.to_string() })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config.events_http_url(), Duration::from_millis(config.stats_timeout_ms()))
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn submit_queue_event(&self, event: &QueueEvent) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?
            .error_for_status()
            .with_context(|| format!("POST {} rejected the event", self.url))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
