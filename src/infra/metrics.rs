//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! Histograms are cumulative so the Prometheus endpoint and the periodic
//! log can both read them; only the max fetch latency resets on report.
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::types::{QueueSnapshot, QueueStatus, Stage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Stats fetch latency bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600
const FETCH_BOUNDS_MS: [u64; 10] = [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];
const NUM_BUCKETS: usize = 11;

/// Leg duration bucket boundaries (seconds)
/// Buckets: ≤30s, ≤1m, ≤2m, ≤5m, ≤10m, ≤15m, ≤20m, ≤30m, ≤45m, ≤60m, >60m
const LEG_BOUNDS_SECS: [u64; 10] = [30, 60, 120, 300, 600, 900, 1200, 1800, 2700, 3600];

#[inline]
fn bucket_index(bounds: &[u64; 10], value: u64) -> usize {
    bounds.partition_point(|&bound| bound < value)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], bounds: &[u64; 10], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile) as u64).max(1);
    let mut cumulative = 0u64;

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            // Overflow bucket reports 2x the last bound
            return bounds.get(i).copied().unwrap_or(bounds[9] * 2);
        }
    }
    bounds[9] * 2
}

#[inline]
fn stage_index(stage: Stage) -> usize {
    match stage {
        Stage::Cashier => 0,
        Stage::Access => 1,
    }
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// `report()` only swaps the periodic max; everything else is read in place.
pub struct Metrics {
    /// Snapshot fetches attempted (monotonic)
    stats_fetch_total: AtomicU64,
    /// Snapshot fetches that failed (monotonic)
    stats_fetch_failures: AtomicU64,
    /// Automatic refreshes skipped because a visitor was mid-flow (monotonic)
    refresh_suppressed_total: AtomicU64,
    /// Fetch latency histogram (cumulative)
    fetch_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of fetch latencies in ms (cumulative)
    fetch_latency_sum_ms: AtomicU64,
    /// Max fetch latency in ms (reset on report)
    fetch_latency_max_ms: AtomicU64,
    /// Last published status gauge (0=unknown, 1=green, 2=yellow, 3=red)
    last_status: AtomicU64,
    /// Last published total wait in tenths of a minute
    last_total_wait_decimin: AtomicU64,
    /// Last published contributor count
    last_contributors: AtomicU64,
    /// Legs timed per stage [cashier, access] (monotonic)
    legs_timed: [AtomicU64; 2],
    /// Leg duration histograms per stage (cumulative)
    leg_duration_buckets: [[AtomicU64; NUM_BUCKETS]; 2],
    /// Sum of leg durations per stage in seconds (cumulative)
    leg_duration_sum_secs: [AtomicU64; 2],
    /// Visits cancelled mid-flow (monotonic)
    cancellations_total: AtomicU64,
    /// Visits that reached the end of the flow (monotonic)
    visits_completed_total: AtomicU64,
    /// Queue events accepted by the sink (monotonic)
    events_submitted: AtomicU64,
    /// Queue events the sink rejected (monotonic)
    events_submit_failed: AtomicU64,
    /// Queue events dropped due to channel full or closed (monotonic)
    events_dropped: AtomicU64,
    /// Queue events discarded as implausible (monotonic)
    events_discarded: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            stats_fetch_total: AtomicU64::new(0),
            stats_fetch_failures: AtomicU64::new(0),
            refresh_suppressed_total: AtomicU64::new(0),
            fetch_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            fetch_latency_sum_ms: AtomicU64::new(0),
            fetch_latency_max_ms: AtomicU64::new(0),
            last_status: AtomicU64::new(QueueStatus::Unknown.gauge_value()),
            last_total_wait_decimin: AtomicU64::new(0),
            last_contributors: AtomicU64::new(0),
            legs_timed: std::array::from_fn(|_| AtomicU64::new(0)),
            leg_duration_buckets: std::array::from_fn(|_| {
                std::array::from_fn(|_| AtomicU64::new(0))
            }),
            leg_duration_sum_secs: std::array::from_fn(|_| AtomicU64::new(0)),
            cancellations_total: AtomicU64::new(0),
            visits_completed_total: AtomicU64::new(0),
            events_submitted: AtomicU64::new(0),
            events_submit_failed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            events_discarded: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a successful snapshot fetch and publish its values as gauges
    pub fn record_fetch_ok(&self, latency_ms: u64, snapshot: &QueueSnapshot) {
        self.stats_fetch_total.fetch_add(1, Ordering::Relaxed);
        self.record_fetch_latency(latency_ms);
        self.last_status.store(snapshot.status.gauge_value(), Ordering::Relaxed);
        self.last_total_wait_decimin
            .store((snapshot.total_wait_minutes.max(0.0) * 10.0).round() as u64, Ordering::Relaxed);
        self.last_contributors.store(u64::from(snapshot.active_contributors), Ordering::Relaxed);
    }

    /// Record a failed snapshot fetch
    pub fn record_fetch_failed(&self, latency_ms: u64) {
        self.stats_fetch_total.fetch_add(1, Ordering::Relaxed);
        self.stats_fetch_failures.fetch_add(1, Ordering::Relaxed);
        self.record_fetch_latency(latency_ms);
    }

    #[inline]
    fn record_fetch_latency(&self, latency_ms: u64) {
        self.fetch_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        let bucket = bucket_index(&FETCH_BOUNDS_MS, latency_ms);
        self.fetch_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.fetch_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_refresh_suppressed(&self) {
        self.refresh_suppressed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed leg with its duration
    pub fn record_leg(&self, stage: Stage, duration_minutes: f64) {
        let idx = stage_index(stage);
        let secs = (duration_minutes.max(0.0) * 60.0) as u64;
        self.legs_timed[idx].fetch_add(1, Ordering::Relaxed);
        self.leg_duration_sum_secs[idx].fetch_add(secs, Ordering::Relaxed);
        let bucket = bucket_index(&LEG_BOUNDS_SECS, secs);
        self.leg_duration_buckets[idx][bucket].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cancellation(&self) {
        self.cancellations_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_visit_completed(&self) {
        self.visits_completed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_submitted(&self) {
        self.events_submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_submit_failed(&self) {
        self.events_submit_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_discarded(&self) {
        self.events_discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn legs_timed(&self, stage: Stage) -> u64 {
        self.legs_timed[stage_index(stage)].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn cancellations_total(&self) -> u64 {
        self.cancellations_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_submitted(&self) -> u64 {
        self.events_submitted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_submit_failed(&self) -> u64 {
        self.events_submit_failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_discarded(&self) -> u64 {
        self.events_discarded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn stats_fetch_failures(&self) -> u64 {
        self.stats_fetch_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn refresh_suppressed_total(&self) -> u64 {
        self.refresh_suppressed_total.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset the periodic max
    pub fn report(&self) -> MetricsSummary {
        let fetch_latency_max_ms = self.fetch_latency_max_ms.swap(0, Ordering::Relaxed);
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed.as_secs_f64()
        };
        self.summarize(fetch_latency_max_ms, elapsed_secs)
    }

    /// Read the current values without touching the periodic state
    pub fn snapshot(&self) -> MetricsSummary {
        let fetch_latency_max_ms = self.fetch_latency_max_ms.load(Ordering::Relaxed);
        let elapsed_secs = self.last_report_time.lock().elapsed().as_secs_f64();
        self.summarize(fetch_latency_max_ms, elapsed_secs)
    }

    fn summarize(&self, fetch_latency_max_ms: u64, elapsed_secs: f64) -> MetricsSummary {
        let fetch_latency_buckets = load_buckets(&self.fetch_latency_buckets);
        let fetch_latency_sum = self.fetch_latency_sum_ms.load(Ordering::Relaxed);
        let fetch_count: u64 = fetch_latency_buckets.iter().sum();
        let fetch_latency_avg_ms =
            if fetch_count > 0 { fetch_latency_sum / fetch_count } else { 0 };
        let fetch_latency_p99_ms =
            percentile_from_buckets(&fetch_latency_buckets, &FETCH_BOUNDS_MS, 0.99);

        let leg = |stage: Stage| {
            let idx = stage_index(stage);
            let buckets = load_buckets(&self.leg_duration_buckets[idx]);
            let count: u64 = buckets.iter().sum();
            let sum = self.leg_duration_sum_secs[idx].load(Ordering::Relaxed);
            LegSummary {
                stage,
                count,
                avg_secs: if count > 0 { sum / count } else { 0 },
                sum_secs: sum,
                p50_secs: percentile_from_buckets(&buckets, &LEG_BOUNDS_SECS, 0.50),
                buckets,
            }
        };

        MetricsSummary {
            period_secs: elapsed_secs,
            stats_fetch_total: self.stats_fetch_total.load(Ordering::Relaxed),
            stats_fetch_failures: self.stats_fetch_failures.load(Ordering::Relaxed),
            refresh_suppressed_total: self.refresh_suppressed_total.load(Ordering::Relaxed),
            fetch_latency_buckets,
            fetch_latency_sum_ms: fetch_latency_sum,
            fetch_latency_avg_ms,
            fetch_latency_max_ms,
            fetch_latency_p99_ms,
            last_status: self.last_status.load(Ordering::Relaxed),
            last_total_wait_minutes: self.last_total_wait_decimin.load(Ordering::Relaxed) as f64
                / 10.0,
            last_contributors: self.last_contributors.load(Ordering::Relaxed),
            cashier: leg(Stage::Cashier),
            access: leg(Stage::Access),
            cancellations_total: self.cancellations_total.load(Ordering::Relaxed),
            visits_completed_total: self.visits_completed_total.load(Ordering::Relaxed),
            events_submitted: self.events_submitted.load(Ordering::Relaxed),
            events_submit_failed: self.events_submit_failed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_FETCH_BOUNDS_MS: [u64; 10] = FETCH_BOUNDS_MS;
pub const METRICS_LEG_BOUNDS_SECS: [u64; 10] = LEG_BOUNDS_SECS;

/// Leg duration statistics for one stage
#[derive(Debug, Clone)]
pub struct LegSummary {
    pub stage: Stage,
    pub count: u64,
    pub avg_secs: u64,
    pub sum_secs: u64,
    pub p50_secs: u64,
    /// Bounds: ≤30s, ≤1m, ≤2m, ≤5m, ≤10m, ≤15m, ≤20m, ≤30m, ≤45m, ≤60m, >60m
    pub buckets: [u64; NUM_BUCKETS],
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    /// Seconds since the previous report
    pub period_secs: f64,
    pub stats_fetch_total: u64,
    pub stats_fetch_failures: u64,
    pub refresh_suppressed_total: u64,
    /// Bounds: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600 ms
    pub fetch_latency_buckets: [u64; NUM_BUCKETS],
    pub fetch_latency_sum_ms: u64,
    pub fetch_latency_avg_ms: u64,
    /// Max since the previous report
    pub fetch_latency_max_ms: u64,
    pub fetch_latency_p99_ms: u64,
    pub last_status: u64,
    pub last_total_wait_minutes: f64,
    pub last_contributors: u64,
    pub cashier: LegSummary,
    pub access: LegSummary,
    pub cancellations_total: u64,
    pub visits_completed_total: u64,
    pub events_submitted: u64,
    pub events_submit_failed: u64,
    pub events_dropped: u64,
    pub events_discarded: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            period_secs = format!("{:.1}", self.period_secs),
            fetches = %self.stats_fetch_total,
            fetch_failures = %self.stats_fetch_failures,
            fetch_avg_ms = %self.fetch_latency_avg_ms,
            fetch_p99_ms = %self.fetch_latency_p99_ms,
            fetch_max_ms = %self.fetch_latency_max_ms,
            refresh_suppressed = %self.refresh_suppressed_total,
            status = %self.last_status,
            total_wait_min = format!("{:.1}", self.last_total_wait_minutes),
            contributors = %self.last_contributors,
            cashier_legs = %self.cashier.count,
            cashier_p50_secs = %self.cashier.p50_secs,
            access_legs = %self.access.count,
            access_p50_secs = %self.access.p50_secs,
            cancellations = %self.cancellations_total,
            events_submitted = %self.events_submitted,
            events_failed = %self.events_submit_failed,
            events_dropped = %self.events_dropped,
            "metrics"
        );
    }
}
