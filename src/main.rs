//! RU Monitor - queue status service for a university dining hall
//!
//! Publishes the estimated wait at the cashier and turnstile queues and
//! collects timed legs reported by visitor kiosks.
//!
//! Module structure:
//! - `domain/` - Core types (QueueSnapshot, QueueEvent, visitor flow)
//! - `io/` - External interfaces (HTTP service, HTTP clients, event files)
//! - `services/` - Business logic (Estimator, Tracker, refresh loop, event worker)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use ru_monitor::domain::VisitorFlowState;
use ru_monitor::infra::{Config, Metrics};
use ru_monitor::io::{event_sink_from_config, stats_source_from_config, AppState};
use ru_monitor::services::{create_event_worker, create_refresh_loop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// RU Monitor - dining hall queue status service
#[derive(Parser, Debug)]
#[command(name = "ru-monitor", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default: INFO, use RUST_LOG=debug for per-transition detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "ru_monitor_starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    let thresholds = config.thresholds();
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        stats_mode = ?config.stats_mode(),
        sink = ?config.sink_mode(),
        refresh_interval_ms = %config.refresh_interval_ms(),
        min_contributors = %thresholds.min_contributors,
        yellow_minutes = %thresholds.yellow_minutes,
        red_minutes = %thresholds.red_minutes,
        server_port = %config.server_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Queue event worker
    let sink = event_sink_from_config(&config)?;
    let (event_tx, worker) = create_event_worker(
        sink,
        metrics.clone(),
        config.events_channel_capacity(),
        config.max_valid_wait_minutes(),
    );
    let worker_handle = tokio::spawn(worker.run());

    // No local visitor here: the board is always eligible for automatic refresh
    let (_visitor_tx, visitor_rx) = watch::channel(VisitorFlowState::Idle);
    let source = stats_source_from_config(&config)?;
    let (_refresh_handle, refresh_loop, board_rx) = create_refresh_loop(
        source,
        visitor_rx,
        Duration::from_millis(config.refresh_interval_ms()),
        metrics.clone(),
    );
    let refresh_handle = tokio::spawn(refresh_loop.run(shutdown_rx.clone()));

    // HTTP service (if port > 0)
    let server_port = config.server_port();
    let server_handle = if server_port > 0 {
        let state = Arc::new(AppState {
            site_id: config.site_id().to_string(),
            metrics: metrics.clone(),
            board_rx,
            event_tx: event_tx.clone(),
            max_valid_minutes: config.max_valid_wait_minutes(),
        });
        let server_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = ru_monitor::io::start_server(server_port, state, server_shutdown).await {
                tracing::error!(error = %format!("{e:#}"), "http_server_error");
            }
        }))
    } else {
        None
    };

    // Periodic metrics log
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    let reporter_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    let _ = refresh_handle.await;
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }
    reporter_handle.abort();

    // Let the worker drain what is already queued
    drop(event_tx);
    match tokio::time::timeout(Duration::from_secs(2), worker_handle).await {
        Ok(_) => {}
        Err(_) => warn!("queue_event_worker_drain_timeout"),
    }

    metrics.report().log();
    info!("ru-monitor shutdown complete");
    Ok(())
}
