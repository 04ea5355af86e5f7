//! Queue status estimation
//!
//! `Estimator` fabricates a plausible snapshot from the hour of day. It sits
//! behind `StatsSource`, the same seam a real backend client implements, so
//! it can be swapped out without touching the tracker or the thresholds.

use crate::domain::daypart::{CountRange, Daypart, MinuteRange};
use crate::domain::types::{QueueSnapshot, Thresholds};
use crate::infra::config::Config;
use async_trait::async_trait;
use chrono::{Local, Timelike};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::debug;

/// Anything that can produce the current queue snapshot
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_queue_stats(&self) -> anyhow::Result<QueueSnapshot>;
}

fn draw_minutes<R: Rng + ?Sized>(rng: &mut R, range: MinuteRange) -> f64 {
    if range.spread > 0.0 {
        range.base + rng.gen::<f64>() * range.spread
    } else {
        range.base
    }
}

fn draw_count<R: Rng + ?Sized>(rng: &mut R, range: CountRange) -> u32 {
    if range.spread > 0 {
        range.base + rng.gen_range(0..range.spread)
    } else {
        range.base
    }
}

/// Build a snapshot from measured or drawn values
pub fn build_snapshot(
    cashier_wait_minutes: f64,
    turnstile_wait_minutes: f64,
    active_contributors: u32,
    thresholds: &Thresholds,
) -> QueueSnapshot {
    let total_wait_minutes = cashier_wait_minutes + turnstile_wait_minutes;
    let status = thresholds.classify(total_wait_minutes, active_contributors);
    QueueSnapshot {
        cashier_wait_minutes,
        turnstile_wait_minutes,
        total_wait_minutes,
        active_contributors,
        status,
        message: status.message().to_string(),
    }
}

/// Synthetic statistics generator
pub struct Estimator {
    thresholds: Thresholds,
    rng: Mutex<StdRng>,
}

impl Estimator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds, rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Deterministic generator for tests and replays
    pub fn with_seed(thresholds: Thresholds, seed: u64) -> Self {
        Self { thresholds, rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    /// Produce a snapshot for the given wall-clock time
    pub fn estimate<T: Timelike>(&self, now: &T) -> QueueSnapshot {
        let mut rng = self.rng.lock();
        estimate_with(&self.thresholds, now, &mut *rng)
    }
}

/// Draw a snapshot for `now` from the caller's generator
pub fn estimate_with<T, R>(thresholds: &Thresholds, now: &T, rng: &mut R) -> QueueSnapshot
where
    T: Timelike,
    R: Rng + ?Sized,
{
    let daypart = Daypart::from_hour(now.hour());
    let profile = daypart.profile();

    let cashier = draw_minutes(rng, profile.cashier);
    let turnstile = draw_minutes(rng, profile.turnstile);
    let contributors = draw_count(rng, profile.contributors);

    let snapshot = build_snapshot(cashier, turnstile, contributors, thresholds);
    debug!(
        daypart = %daypart.as_str(),
        total_wait_min = format!("{:.1}", snapshot.total_wait_minutes),
        contributors = %snapshot.active_contributors,
        status = %snapshot.status,
        "queue_estimated"
    );
    snapshot
}

/// `StatsSource` backed by the estimator, with an artificial response delay
pub struct MockStatsSource {
    estimator: Estimator,
    delay: Duration,
}

impl MockStatsSource {
    pub fn new(estimator: Estimator, delay: Duration) -> Self {
        Self { estimator, delay }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Estimator::new(config.thresholds()),
            Duration::from_millis(config.mock_delay_ms()),
        )
    }
}

#[async_trait]
impl StatsSource for MockStatsSource {
    async fn fetch_queue_stats(&self) -> anyhow::Result<QueueSnapshot> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.estimator.estimate(&Local::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::QueueStatus;
    use chrono::NaiveTime;

    fn at_hour(hour: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, 30, 0).unwrap()
    }

    #[test]
    fn test_build_snapshot_sums_legs() {
        let snapshot = build_snapshot(12.5, 4.0, 50, &Thresholds::default());
        assert_eq!(snapshot.total_wait_minutes, 16.5);
        assert_eq!(snapshot.status, QueueStatus::Yellow);
        assert_eq!(snapshot.message, "Fluxo moderado.");
    }

    #[test]
    fn test_build_snapshot_unknown_below_min_sample() {
        for total in [0.0, 5.0, 15.0, 25.0, 90.0] {
            let snapshot = build_snapshot(total, 0.0, 9, &Thresholds::default());
            assert_eq!(snapshot.status, QueueStatus::Unknown);
            assert_eq!(snapshot.message, "Dados insuficientes.");
        }
    }

    #[test]
    fn test_build_snapshot_threshold_boundaries() {
        let thresholds = Thresholds::default();
        assert_eq!(build_snapshot(20.0, 5.0, 50, &thresholds).status, QueueStatus::Red);
        assert_eq!(build_snapshot(10.0, 5.0, 50, &thresholds).status, QueueStatus::Yellow);
        assert_eq!(build_snapshot(4.0, 1.0, 50, &thresholds).status, QueueStatus::Green);
        assert_eq!(build_snapshot(15.0, 5.0, 50, &thresholds).status, QueueStatus::Yellow);
        assert_eq!(build_snapshot(7.0, 3.0, 50, &thresholds).status, QueueStatus::Green);
    }

    #[test]
    fn test_lunch_peak_draws() {
        let estimator = Estimator::with_seed(Thresholds::default(), 42);
        let mut busy = 0;
        for _ in 0..500 {
            let snapshot = estimator.estimate(&at_hour(12));
            assert!(snapshot.active_contributors >= 80);
            assert!(snapshot.active_contributors < 100);
            assert!(snapshot.cashier_wait_minutes >= 15.0 && snapshot.cashier_wait_minutes < 25.0);
            assert!(snapshot.turnstile_wait_minutes >= 5.0 && snapshot.turnstile_wait_minutes < 10.0);
            if matches!(snapshot.status, QueueStatus::Yellow | QueueStatus::Red) {
                busy += 1;
            }
        }
        assert!(busy >= 495, "only {busy} of 500 lunch draws were busy");
    }

    #[test]
    fn test_dinner_peak_draws() {
        let estimator = Estimator::with_seed(Thresholds::default(), 7);
        for _ in 0..200 {
            let snapshot = estimator.estimate(&at_hour(18));
            assert!((50..70).contains(&snapshot.active_contributors));
            assert!(snapshot.total_wait_minutes >= 13.0 && snapshot.total_wait_minutes < 21.0);
            assert_ne!(snapshot.status, QueueStatus::Unknown);
        }
    }

    #[test]
    fn test_off_peak_is_green_or_unknown() {
        let estimator = Estimator::with_seed(Thresholds::default(), 3);
        let mut saw_unknown = false;
        let mut saw_green = false;
        for _ in 0..200 {
            let snapshot = estimator.estimate(&at_hour(9));
            assert_eq!(snapshot.total_wait_minutes, 3.0);
            assert!((5..25).contains(&snapshot.active_contributors));
            match snapshot.status {
                QueueStatus::Unknown => {
                    assert!(snapshot.active_contributors < 10);
                    saw_unknown = true;
                }
                QueueStatus::Green => saw_green = true,
                other => panic!("unexpected off-peak status {other}"),
            }
        }
        assert!(saw_unknown && saw_green);
    }

    #[test]
    fn test_seeded_estimators_repeat() {
        let a = Estimator::with_seed(Thresholds::default(), 99);
        let b = Estimator::with_seed(Thresholds::default(), 99);
        assert_eq!(a.estimate(&at_hour(12)), b.estimate(&at_hour(12)));
    }

    #[test]
    fn test_estimate_with_caller_rng() {
        let mut a = StdRng::seed_from_u64(5);
        let mut b = StdRng::seed_from_u64(5);
        let thresholds = Thresholds::default();
        assert_eq!(
            estimate_with(&thresholds, &at_hour(18), &mut a),
            estimate_with(&thresholds, &at_hour(18), &mut b)
        );
    }

    #[tokio::test]
    async fn test_mock_source_returns_snapshot() {
        let source = MockStatsSource::new(
            Estimator::with_seed(Thresholds::default(), 1),
            Duration::ZERO,
        );
        let snapshot = source.fetch_queue_stats().await.unwrap();
        assert_eq!(
            snapshot.total_wait_minutes,
            snapshot.cashier_wait_minutes + snapshot.turnstile_wait_minutes
        );
    }
}
