//! Rolling per-topic mention-rate baselines
//!
//! A topic's baseline is the "normal" reference the burst calculator
//! compares current activity against. Counts are bucketed by hour over a
//! trailing window (default 30 days); mean and variance are maintained with
//! Welford's online algorithm so neither updates nor age-outs rescan the
//! full history.
//!
//! A baseline with too few data points (or zero variance) is insufficiently
//! established: callers get `InsufficientBaseline` and must treat the topic
//! as unclassified rather than anomalous.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::BaselineSnapshot;

/// Errors raised by baseline estimation
#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("baseline for '{topic}' has {data_points} data points, needs {required}")]
    InsufficientBaseline {
        topic: String,
        data_points: u64,
        required: u64,
    },
}

/// Rolling statistics for one normalized topic/entity.
///
/// `data_points` is the number of distinct hourly buckets inside the window;
/// mean/variance are over bucket totals. All values stay non-negative and
/// consistent with the sliding window as buckets age out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicBaseline {
    pub topic: String,

    /// Hourly totals, keyed by the truncated hour
    buckets: BTreeMap<DateTime<Utc>, u64>,

    // Welford accumulators over bucket totals
    count: u64,
    mean: f64,
    m2: f64,

    pub last_calculated_at: DateTime<Utc>,
}

impl TopicBaseline {
    pub fn new(topic: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            topic: topic.into(),
            buckets: BTreeMap::new(),
            count: 0,
            mean: 0.0,
            m2: 0.0,
            last_calculated_at: now,
        }
    }

    /// Number of hourly data points inside the window
    pub fn data_points(&self) -> u64 {
        self.count
    }

    /// Average mentions per hour (0 when no data)
    pub fn avg_hourly_mentions(&self) -> f64 {
        self.mean
    }

    /// Average mentions per day, derived from the hourly mean
    pub fn avg_daily_mentions(&self) -> f64 {
        self.mean * 24.0
    }

    /// Population variance of hourly totals (0 when no data)
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0)
        }
    }

    /// Standard deviation of hourly totals
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Record mentions observed for one hour bucket.
    ///
    /// Re-observing the same hour accumulates into the existing bucket; the
    /// Welford accumulators are adjusted by removing the old bucket total and
    /// re-adding the new one.
    pub fn observe(&mut self, window_timestamp: DateTime<Utc>, new_count: u64) {
        let hour = truncate_to_hour(window_timestamp);

        match self.buckets.get_mut(&hour) {
            Some(existing) => {
                let old = *existing;
                *existing += new_count;
                let updated = *existing;
                self.welford_remove(old as f64);
                self.welford_add(updated as f64);
            }
            None => {
                self.buckets.insert(hour, new_count);
                self.welford_add(new_count as f64);
            }
        }
    }

    /// Age out buckets older than the cutoff, keeping statistics consistent
    /// with the remaining window
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) {
        let cutoff = truncate_to_hour(cutoff);
        let aged: Vec<DateTime<Utc>> = self
            .buckets
            .range(..cutoff)
            .map(|(ts, _)| *ts)
            .collect();

        for ts in aged {
            if let Some(count) = self.buckets.remove(&ts) {
                self.welford_remove(count as f64);
            }
        }
    }

    /// Highest total over any sliding 24h span inside the window
    pub fn peak_mentions_24h(&self) -> u64 {
        let mut peak = 0u64;
        let hours: Vec<(&DateTime<Utc>, &u64)> = self.buckets.iter().collect();

        for (i, (start, _)) in hours.iter().enumerate() {
            let span_end = **start + Duration::hours(24);
            let total: u64 = hours[i..]
                .iter()
                .take_while(|(ts, _)| **ts < span_end)
                .map(|(_, c)| **c)
                .sum();
            peak = peak.max(total);
        }

        peak
    }

    /// Point-in-time snapshot for attachment to a trend event
    pub fn snapshot(&self) -> BaselineSnapshot {
        BaselineSnapshot {
            avg_hourly_mentions: self.avg_hourly_mentions(),
            avg_daily_mentions: self.avg_daily_mentions(),
            std_dev_hourly: self.std_dev(),
            peak_mentions_24h: self.peak_mentions_24h(),
            data_points: self.data_points(),
        }
    }

    fn welford_add(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn welford_remove(&mut self, x: f64) {
        match self.count {
            0 => {}
            1 => {
                self.count = 0;
                self.mean = 0.0;
                self.m2 = 0.0;
            }
            n => {
                let n = n as f64;
                let new_mean = (n * self.mean - x) / (n - 1.0);
                self.m2 -= (x - self.mean) * (x - new_mean);
                self.m2 = self.m2.max(0.0);
                self.mean = new_mean;
                self.count -= 1;
            }
        }
    }
}

/// Maintains topic baselines over a trailing window
#[derive(Debug, Clone)]
pub struct BaselineEstimator {
    window: Duration,
    min_data_points: u64,
}

impl BaselineEstimator {
    pub fn new(window_days: u32, min_data_points: u64) -> Self {
        Self {
            window: Duration::days(window_days as i64),
            min_data_points,
        }
    }

    /// Apply one observation: prune aged buckets, then fold in the new count.
    pub fn update_baseline(
        &self,
        baseline: &mut TopicBaseline,
        new_count: u64,
        window_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        baseline.prune_before(now - self.window);
        baseline.observe(window_timestamp, new_count);
        baseline.last_calculated_at = now;
    }

    /// Check whether a baseline supports anomaly classification yet
    pub fn check_established(&self, baseline: &TopicBaseline) -> Result<(), BaselineError> {
        if baseline.data_points() < self.min_data_points {
            return Err(BaselineError::InsufficientBaseline {
                topic: baseline.topic.clone(),
                data_points: baseline.data_points(),
                required: self.min_data_points,
            });
        }
        Ok(())
    }
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::hours(1)).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hour(base: DateTime<Utc>, offset: i64) -> DateTime<Utc> {
        truncate_to_hour(base) + Duration::hours(offset)
    }

    #[test]
    fn test_empty_baseline_is_zero() {
        let now = Utc::now();
        let baseline = TopicBaseline::new("topic", now);
        assert_eq!(baseline.data_points(), 0);
        assert_eq!(baseline.avg_hourly_mentions(), 0.0);
        assert_eq!(baseline.std_dev(), 0.0);
        assert_eq!(baseline.peak_mentions_24h(), 0);
    }

    #[test]
    fn test_welford_matches_direct_computation() {
        let now = Utc::now();
        let mut baseline = TopicBaseline::new("topic", now);
        let counts = [4u64, 8, 15, 16, 23, 42];

        for (i, c) in counts.iter().enumerate() {
            baseline.observe(hour(now, i as i64), *c);
        }

        let n = counts.len() as f64;
        let mean = counts.iter().sum::<u64>() as f64 / n;
        let variance = counts
            .iter()
            .map(|&c| (c as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        assert!((baseline.avg_hourly_mentions() - mean).abs() < 1e-9);
        assert!((baseline.variance() - variance).abs() < 1e-9);
    }

    #[test]
    fn test_same_hour_accumulates() {
        let now = Utc::now();
        let mut baseline = TopicBaseline::new("topic", now);
        baseline.observe(hour(now, 0), 3);
        baseline.observe(hour(now, 0), 4);

        assert_eq!(baseline.data_points(), 1);
        assert!((baseline.avg_hourly_mentions() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_prune_keeps_stats_consistent() {
        let now = Utc::now();
        let mut baseline = TopicBaseline::new("topic", now);
        baseline.observe(hour(now, -100), 1000);
        baseline.observe(hour(now, 0), 10);
        baseline.observe(hour(now, 1), 12);

        baseline.prune_before(hour(now, -1));

        assert_eq!(baseline.data_points(), 2);
        assert!((baseline.avg_hourly_mentions() - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_prune_to_empty_resets() {
        let now = Utc::now();
        let mut baseline = TopicBaseline::new("topic", now);
        baseline.observe(hour(now, -10), 5);
        baseline.prune_before(hour(now, 0));

        assert_eq!(baseline.data_points(), 0);
        assert_eq!(baseline.avg_hourly_mentions(), 0.0);
        assert_eq!(baseline.variance(), 0.0);
    }

    #[test]
    fn test_peak_24h_sliding_window() {
        let now = Utc::now();
        let mut baseline = TopicBaseline::new("topic", now);
        // two clusters of activity 48h apart
        for i in 0..6 {
            baseline.observe(hour(now, i), 10);
        }
        for i in 48..54 {
            baseline.observe(hour(now, i), 20);
        }

        assert_eq!(baseline.peak_mentions_24h(), 120);
    }

    #[test]
    fn test_estimator_window_and_threshold() {
        let now = Utc::now();
        let estimator = BaselineEstimator::new(30, 24);
        let mut baseline = TopicBaseline::new("topic", now);

        // a point far outside the 30-day window ages out on the next update
        estimator.update_baseline(&mut baseline, 7, now - Duration::days(45), now);
        estimator.update_baseline(&mut baseline, 3, now, now);

        assert_eq!(baseline.data_points(), 1);
        assert!(estimator.check_established(&baseline).is_err());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let now = Utc::now();
        let mut baseline = TopicBaseline::new("topic", now);
        for i in 0..24 {
            baseline.observe(hour(now, -i), 10);
        }
        let snap = baseline.snapshot();
        assert_eq!(snap.data_points, 24);
        assert!((snap.avg_hourly_mentions - 10.0).abs() < 1e-9);
        assert!((snap.avg_daily_mentions - 240.0).abs() < 1e-9);
        assert_eq!(snap.peak_mentions_24h, 240);
    }
}
