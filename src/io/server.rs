//! HTTP service
//!
//! Serves the current board snapshot, accepts queue events from remote
//! kiosks, and exposes metrics in Prometheus text format. Uses hyper for the
//! HTTP server.
//!
//! Routes:
//! - `GET /stats`   - latest `QueueSnapshot` as JSON (503 until the first load)
//! - `POST /events` - `{"stage":"cashier","duration_minutes":3.5}`, 202 on accept
//! - `GET /metrics` - Prometheus text exposition
//! - `GET /health`  - liveness

use crate::domain::types::{new_uuid_v7, QueueEvent, Stage};
use crate::infra::metrics::{
    LegSummary, Metrics, MetricsSummary, METRICS_FETCH_BOUNDS_MS, METRICS_LEG_BOUNDS_SECS,
    METRICS_NUM_BUCKETS,
};
use crate::services::refresh::BoardState;
use anyhow::Context;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const MAX_BODY_BYTES: usize = 16 * 1024;

/// Everything a request handler needs
pub struct AppState {
    pub site_id: String,
    pub metrics: Arc<Metrics>,
    pub board_rx: watch::Receiver<BoardState>,
    pub event_tx: mpsc::Sender<QueueEvent>,
    pub max_valid_minutes: f64,
}

/// Body accepted by `POST /events`
#[derive(Debug, Deserialize)]
struct EventIntake {
    stage: Stage,
    duration_minutes: f64,
    #[serde(default)]
    session_id: Option<String>,
}

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

fn write_gauge_f64(output: &mut String, name: &str, help: &str, site: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val:.1}");
}

/// Write a histogram with cumulative buckets, sum and count
///
/// `labels` is the full label set without braces, e.g. `site="ru",stage="cashier"`.
fn write_histogram(
    output: &mut String,
    name: &str,
    labels: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{{labels},le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{{labels},le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{{labels}}} {sum}");
    let _ = writeln!(output, "{name}_count{{{labels}}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_status_metrics(&mut output, site_id, &summary);
    write_fetch_metrics(&mut output, site_id, &summary);
    write_visit_metrics(&mut output, site_id, &summary);
    write_event_metrics(&mut output, site_id, &summary);

    output
}

fn write_status_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "ru_queue_status",
        "Last published status (0=unknown, 1=green, 2=yellow, 3=red)",
        MetricType::Gauge,
        site,
        summary.last_status,
    );
    write_gauge_f64(
        output,
        "ru_queue_total_wait_minutes",
        "Last published total wait in minutes",
        site,
        summary.last_total_wait_minutes,
    );
    write_metric(
        output,
        "ru_queue_active_contributors",
        "Last published contributor count",
        MetricType::Gauge,
        site,
        summary.last_contributors,
    );
}

fn write_fetch_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "ru_stats_fetch_total",
        "Snapshot fetches attempted",
        MetricType::Counter,
        site,
        summary.stats_fetch_total,
    );
    write_metric(
        output,
        "ru_stats_fetch_failures_total",
        "Snapshot fetches that failed",
        MetricType::Counter,
        site,
        summary.stats_fetch_failures,
    );
    write_metric(
        output,
        "ru_refresh_suppressed_total",
        "Automatic refreshes skipped while a visitor was mid-flow",
        MetricType::Counter,
        site,
        summary.refresh_suppressed_total,
    );

    let name = "ru_stats_fetch_latency_ms";
    let _ = writeln!(output, "# HELP {name} Snapshot fetch latency in milliseconds");
    let _ = writeln!(output, "# TYPE {name} histogram");
    write_histogram(
        output,
        name,
        &format!("site=\"{site}\""),
        &summary.fetch_latency_buckets,
        &METRICS_FETCH_BOUNDS_MS,
        summary.fetch_latency_sum_ms,
    );
    write_metric(
        output,
        "ru_stats_fetch_latency_p99_ms",
        "99th percentile fetch latency",
        MetricType::Gauge,
        site,
        summary.fetch_latency_p99_ms,
    );
}

fn write_leg_histogram(output: &mut String, site: &str, leg: &LegSummary) {
    write_histogram(
        output,
        "ru_leg_duration_seconds",
        &format!("site=\"{site}\",stage=\"{}\"", leg.stage),
        &leg.buckets,
        &METRICS_LEG_BOUNDS_SECS,
        leg.sum_secs,
    );
}

fn write_visit_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    let _ = writeln!(output, "# HELP ru_leg_duration_seconds Timed queue leg duration");
    let _ = writeln!(output, "# TYPE ru_leg_duration_seconds histogram");
    write_leg_histogram(output, site, &summary.cashier);
    write_leg_histogram(output, site, &summary.access);

    write_metric(
        output,
        "ru_visits_completed_total",
        "Visits that reached the end of the flow",
        MetricType::Counter,
        site,
        summary.visits_completed_total,
    );
    write_metric(
        output,
        "ru_visits_cancelled_total",
        "Visits cancelled mid-flow",
        MetricType::Counter,
        site,
        summary.cancellations_total,
    );
}

fn write_event_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "ru_queue_events_submitted_total",
        "Queue events accepted by the sink",
        MetricType::Counter,
        site,
        summary.events_submitted,
    );
    write_metric(
        output,
        "ru_queue_events_failed_total",
        "Queue events the sink rejected",
        MetricType::Counter,
        site,
        summary.events_submit_failed,
    );
    write_metric(
        output,
        "ru_queue_events_dropped_total",
        "Queue events dropped due to channel full or closed",
        MetricType::Counter,
        site,
        summary.events_dropped,
    );
    write_metric(
        output,
        "ru_queue_events_discarded_total",
        "Queue events discarded as implausible",
        MetricType::Counter,
        site,
        summary.events_discarded,
    );
}

fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(body.into()))
        .expect("static response should not fail")
}

fn json_error(status: StatusCode, error: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "ok": false, "error": error }).to_string();
    respond(status, "application/json", body)
}

fn handle_stats(state: &AppState) -> Response<Full<Bytes>> {
    let board = state.board_rx.borrow().clone();
    match board.snapshot {
        Some(snapshot) => match serde_json::to_string(&snapshot) {
            Ok(body) => respond(StatusCode::OK, "application/json", body),
            Err(e) => {
                error!(error = %e, "snapshot_serialize_failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "serialize_failed")
            }
        },
        None => json_error(StatusCode::SERVICE_UNAVAILABLE, "no_snapshot_yet"),
    }
}

/// Validate a submitted body and queue it for the worker
fn accept_event(state: &AppState, body: &[u8]) -> Response<Full<Bytes>> {
    let intake: EventIntake = match serde_json::from_slice(body) {
        Ok(intake) => intake,
        Err(e) => {
            debug!(error = %e, "event_intake_malformed");
            return json_error(StatusCode::BAD_REQUEST, "malformed_body");
        }
    };

    let session_id = intake.session_id.unwrap_or_else(new_uuid_v7);
    let event = QueueEvent::new(intake.stage, intake.duration_minutes, &session_id);
    if !event.is_plausible(state.max_valid_minutes) {
        state.metrics.record_event_discarded();
        warn!(
            stage = %event.stage,
            duration_min = %event.duration_minutes,
            "event_intake_rejected"
        );
        return json_error(StatusCode::BAD_REQUEST, "invalid_duration");
    }

    match state.event_tx.try_send(event) {
        Ok(()) => {
            let body = serde_json::json!({ "ok": true, "session_id": session_id }).to_string();
            respond(StatusCode::ACCEPTED, "application/json", body)
        }
        Err(TrySendError::Full(_)) => {
            state.metrics.record_event_dropped();
            warn!("event_intake_channel_full");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "busy")
        }
        Err(TrySendError::Closed(_)) => {
            state.metrics.record_event_dropped();
            warn!("event_intake_channel_closed");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
        }
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/stats") => handle_stats(&state),
        (&Method::POST, "/events") => {
            match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
                Ok(collected) => accept_event(&state, &collected.to_bytes()),
                Err(e) => {
                    debug!(error = %e, "event_intake_body_error");
                    json_error(StatusCode::BAD_REQUEST, "unreadable_body")
                }
            }
        }
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&state.metrics, &state.site_id);
            respond(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        (&Method::OPTIONS, "/events") => Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "POST, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::new()))
            .expect("static response should not fail"),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(response)
}

/// Serve on an already bound listener until shutdown
///
/// Open connections are aborted on shutdown, so once this returns no
/// handler still holds the state or its event sender.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, site = %state.site_id, "http_server_started");
    let mut connections = JoinSet::new();

    loop {
        // Reap finished connections
        while connections.try_join_next().is_some() {}

        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        connections.spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    let open = connections.len();
                    connections.shutdown().await;
                    info!(open_connections = %open, "http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind `0.0.0.0:<port>` and serve
pub async fn start_server(
    port: u16,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener =
        TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {addr}"))?;
    serve(listener, state, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{QueueSnapshot, QueueStatus};

    fn test_state(capacity: usize) -> (Arc<AppState>, mpsc::Receiver<QueueEvent>, watch::Sender<BoardState>) {
        let (board_tx, board_rx) = watch::channel(BoardState::default());
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let state = Arc::new(AppState {
            site_id: "ru".to_string(),
            metrics: Arc::new(Metrics::new()),
            board_rx,
            event_tx,
            max_valid_minutes: 180.0,
        });
        (state, event_rx, board_tx)
    }

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        let snapshot = QueueSnapshot {
            cashier_wait_minutes: 18.0,
            turnstile_wait_minutes: 6.5,
            total_wait_minutes: 24.5,
            active_contributors: 91,
            status: QueueStatus::Red,
            message: QueueStatus::Red.message().to_string(),
        };
        metrics.record_fetch_ok(820, &snapshot);
        metrics.record_leg(Stage::Cashier, 2.0);
        metrics.record_leg(Stage::Access, 0.5);

        let output = format_prometheus_metrics(&metrics, "ru");

        assert!(output.contains("ru_queue_status{site=\"ru\"} 3"));
        assert!(output.contains("ru_queue_total_wait_minutes{site=\"ru\"} 24.5"));
        assert!(output.contains("ru_queue_active_contributors{site=\"ru\"} 91"));
        assert!(output.contains("ru_stats_fetch_latency_ms_bucket{site=\"ru\",le=\"1600\"} 1"));
        assert!(output.contains(
            "ru_leg_duration_seconds_bucket{site=\"ru\",stage=\"cashier\",le=\"120\"} 1"
        ));
        assert!(output.contains("ru_leg_duration_seconds_sum{site=\"ru\",stage=\"access\"} 30"));
        assert!(output.contains("ru_leg_duration_seconds_count{site=\"ru\",stage=\"access\"} 1"));
        assert_eq!(output.matches("# TYPE ru_leg_duration_seconds histogram").count(), 1);
    }

    #[test]
    fn test_repeated_scrapes_do_not_reset_fetch_histogram() {
        let metrics = Metrics::new();
        let snapshot = QueueSnapshot {
            cashier_wait_minutes: 4.0,
            turnstile_wait_minutes: 1.0,
            total_wait_minutes: 5.0,
            active_contributors: 20,
            status: QueueStatus::Green,
            message: QueueStatus::Green.message().to_string(),
        };
        metrics.record_fetch_ok(75, &snapshot);

        let first = format_prometheus_metrics(&metrics, "ru");
        let second = format_prometheus_metrics(&metrics, "ru");
        // The periodic log reads the same counters
        metrics.report().log();
        let third = format_prometheus_metrics(&metrics, "ru");

        for output in [&first, &second, &third] {
            assert!(output.contains("ru_stats_fetch_latency_ms_count{site=\"ru\"} 1"));
            assert!(output.contains("ru_stats_fetch_latency_ms_sum{site=\"ru\"} 75"));
            assert!(output.contains("ru_stats_fetch_latency_ms_bucket{site=\"ru\",le=\"100\"} 1"));
            assert!(output.contains("ru_stats_fetch_total{site=\"ru\"} 1"));
        }
    }

    #[test]
    fn test_histogram_is_cumulative() {
        let mut output = String::new();
        let mut buckets = [0u64; METRICS_NUM_BUCKETS];
        buckets[0] = 2;
        buckets[3] = 1;
        buckets[10] = 4;
        write_histogram(&mut output, "h", "site=\"x\"", &buckets, &METRICS_LEG_BOUNDS_SECS, 99);

        assert!(output.contains("h_bucket{site=\"x\",le=\"30\"} 2"));
        assert!(output.contains("h_bucket{site=\"x\",le=\"300\"} 3"));
        assert!(output.contains("h_bucket{site=\"x\",le=\"3600\"} 3"));
        assert!(output.contains("h_bucket{site=\"x\",le=\"+Inf\"} 7"));
        assert!(output.contains("h_count{site=\"x\"} 7"));
        assert!(output.contains("h_sum{site=\"x\"} 99"));
    }

    #[test]
    fn test_accept_event_queues_valid_body() {
        let (state, mut event_rx, _board_tx) = test_state(4);
        let response = accept_event(&state, br#"{"stage":"cashier","duration_minutes":3.5}"#);
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let event = event_rx.try_recv().unwrap();
        assert_eq!(event.stage, Stage::Cashier);
        assert_eq!(event.duration_minutes, 3.5);
        assert!(!event.session_id.is_empty());
    }

    #[test]
    fn test_accept_event_keeps_session_id() {
        let (state, mut event_rx, _board_tx) = test_state(4);
        let body = br#"{"stage":"access","duration_minutes":1,"session_id":"kiosk-7"}"#;
        assert_eq!(accept_event(&state, body).status(), StatusCode::ACCEPTED);
        assert_eq!(event_rx.try_recv().unwrap().session_id, "kiosk-7");
    }

    #[test]
    fn test_accept_event_rejects_bad_input() {
        let (state, mut event_rx, _board_tx) = test_state(4);
        let bodies: [&[u8]; 5] = [
            b"not json",
            br#"{"stage":"kitchen","duration_minutes":3}"#,
            br#"{"stage":"cashier"}"#,
            br#"{"stage":"cashier","duration_minutes":-2}"#,
            br#"{"stage":"cashier","duration_minutes":181}"#,
        ];
        for body in bodies {
            assert_eq!(accept_event(&state, body).status(), StatusCode::BAD_REQUEST);
        }
        assert!(event_rx.try_recv().is_err());
        assert_eq!(state.metrics.events_discarded(), 2);
    }

    #[test]
    fn test_accept_event_full_channel() {
        let (state, _event_rx, _board_tx) = test_state(1);
        let body = br#"{"stage":"cashier","duration_minutes":2}"#;
        assert_eq!(accept_event(&state, body).status(), StatusCode::ACCEPTED);
        assert_eq!(accept_event(&state, body).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.metrics.events_dropped(), 1);
    }

    #[test]
    fn test_stats_unavailable_until_first_load() {
        let (state, _event_rx, board_tx) = test_state(1);
        assert_eq!(handle_stats(&state).status(), StatusCode::SERVICE_UNAVAILABLE);

        board_tx.send_modify(|board| {
            board.snapshot = Some(QueueSnapshot {
                cashier_wait_minutes: 2.0,
                turnstile_wait_minutes: 1.0,
                total_wait_minutes: 3.0,
                active_contributors: 12,
                status: QueueStatus::Green,
                message: QueueStatus::Green.message().to_string(),
            });
        });
        assert_eq!(handle_stats(&state).status(), StatusCode::OK);
    }
}
