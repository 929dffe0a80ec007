//! Velocity and burst metrics
//!
//! Pure functions over (current windowed counts, baseline, config), with no
//! hidden state, so every operational query here is independently testable:
//! - `velocity`: ratio of current to baseline mention rate
//! - `z_score`: deviation in baseline standard deviations
//! - `poisson_surprise`: negative log-probability of the observed count
//!   under a Poisson null model, which rewards rare bursts on quiet topics
//!   over the same absolute jump on noisy ones
//! - `acceleration`: velocity delta against the previous window
//! - `cross_source_score`: corroboration across distinct source types
//! - breaking/trending classification against configured thresholds
//!
//! Insufficient baselines classify as `Unclassified`, never as a false
//! anomaly. NaN/negative inputs are rejected upstream by the normalizer and
//! never reach this module.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{DiscreteCDF, Poisson};
use std::collections::BTreeMap;

use crate::config::{DetectionConfig, ScoringWeights};
use crate::models::{BaselineSnapshot, SourceType, TierCounts, TrendMetrics, WindowCounts};

/// Guard against division by zero in rate ratios
pub const EPSILON: f64 = 1e-6;

/// Probability floor; caps poisson surprise at -ln(MIN_PROB)
const MIN_PROB: f64 = 1e-12;

/// Burst classification for one observation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstClass {
    /// Baseline not established; no claim either way
    Unclassified,
    /// Activity within normal range
    Quiet,
    /// Above baseline but below spike thresholds
    Elevated,
    /// Statistically significant burst over an established baseline
    Spike,
    /// Meaningful activity on a topic with (near-)zero baseline
    Breakthrough,
}

/// One anomalous observation from a lookback scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    pub count: u64,
    pub z_score: f64,
}

/// Current mention rate over baseline rate.
///
/// A ratio rather than a difference: a quiet topic jumping from ~0 to any
/// real activity produces a very large value, which classification flags as
/// breakthrough instead of spike.
pub fn velocity(current_rate: f64, baseline_rate: f64) -> f64 {
    current_rate / baseline_rate.max(EPSILON)
}

/// Z-score of the current 1h count against the hourly baseline.
///
/// The std-dev floor (`baseline_min_deviation_pct` of the mean) keeps
/// near-constant baselines from manufacturing huge z-scores.
pub fn z_score(current_1h: u64, baseline: &BaselineSnapshot, config: &DetectionConfig) -> f64 {
    let floor = config.std_dev_floor(baseline.avg_hourly_mentions);
    let effective_std = baseline.std_dev_hourly.max(floor).max(EPSILON);
    (current_1h as f64 - baseline.avg_hourly_mentions) / effective_std
}

/// Negative log-probability of observing `current_1h` or more mentions under
/// Poisson(baseline mean).
pub fn poisson_surprise(current_1h: u64, baseline_mean_hourly: f64) -> f64 {
    if current_1h == 0 {
        return 0.0;
    }
    if baseline_mean_hourly <= EPSILON {
        // degenerate null model: any activity is maximally surprising
        return -MIN_PROB.ln();
    }

    let poisson = match Poisson::new(baseline_mean_hourly) {
        Ok(p) => p,
        Err(_) => return 0.0,
    };

    // P(X >= k) = survival function at k - 1
    let p_at_least = poisson.sf(current_1h - 1);
    -p_at_least.max(MIN_PROB).ln()
}

/// Velocity delta between the current and previous window
pub fn acceleration(current_velocity: f64, previous_velocity: f64) -> f64 {
    current_velocity - previous_velocity
}

/// Corroboration score across distinct source types.
///
/// Sums the configured weight of every source type present and normalizes by
/// the total configured weight, yielding [0, 1]. Volume within a type does
/// not matter, so one noisy source cannot inflate the score. Fewer than
/// `min_source_count` distinct types scores 0.
pub fn cross_source_score(
    type_counts: &BTreeMap<SourceType, u64>,
    config: &DetectionConfig,
) -> f64 {
    let present: Vec<SourceType> = type_counts
        .iter()
        .filter(|(_, &count)| count > 0)
        .map(|(&st, _)| st)
        .collect();

    if (present.len() as u32) < config.min_source_count {
        return 0.0;
    }

    let total_weight: f64 = SourceType::all()
        .iter()
        .map(|st| config.source_weight(*st))
        .sum();
    if total_weight <= 0.0 {
        return 0.0;
    }

    let present_weight: f64 = present.iter().map(|st| config.source_weight(*st)).sum();
    present_weight / total_weight
}

/// Bounded composite of velocity, z-score and surprise.
///
/// Each component is capped before mixing so one runaway term cannot
/// dominate; weights are configuration, not constants.
pub fn velocity_score(
    velocity: f64,
    z_score: f64,
    poisson_surprise: f64,
    weights: &ScoringWeights,
) -> f64 {
    let cap = weights.component_cap;
    weights.velocity_weight * velocity.clamp(0.0, cap)
        + weights.z_score_weight * z_score.clamp(0.0, cap)
        + weights.surprise_weight * poisson_surprise.clamp(0.0, cap)
}

/// Compute the full metric set for one event update
pub fn compute_metrics(
    counts: &WindowCounts,
    previous_velocity: f64,
    baseline: &BaselineSnapshot,
    type_counts: &BTreeMap<SourceType, u64>,
    config: &DetectionConfig,
    weights: &ScoringWeights,
) -> TrendMetrics {
    let current_rate = counts.count_1h as f64;
    let v = velocity(current_rate, baseline.avg_hourly_mentions);
    let z = z_score(counts.count_1h, baseline, config);
    let surprise = poisson_surprise(counts.count_1h, baseline.avg_hourly_mentions);

    TrendMetrics {
        velocity: v,
        acceleration: acceleration(v, previous_velocity),
        z_score: z,
        poisson_surprise: surprise,
        cross_source_score: cross_source_score(type_counts, config),
        velocity_score: velocity_score(v, z, surprise, weights),
    }
}

/// Classify the burst state of one window against its baseline
pub fn classify(
    counts: &WindowCounts,
    baseline: &BaselineSnapshot,
    config: &DetectionConfig,
) -> BurstClass {
    if !baseline.is_established(config.baseline_min_data_points) {
        // no established normal; meaningful volume is a breakthrough,
        // anything less stays unclassified
        if counts.count_24h >= config.min_mentions_breakthrough {
            return BurstClass::Breakthrough;
        }
        return BurstClass::Unclassified;
    }

    let v = velocity(counts.count_1h as f64, baseline.avg_hourly_mentions);
    let z = z_score(counts.count_1h, baseline, config);

    if z >= config.anomaly_z_threshold && v >= config.min_spike_ratio {
        BurstClass::Spike
    } else if z >= config.anomaly_z_threshold || v >= config.min_spike_ratio {
        BurstClass::Elevated
    } else {
        BurstClass::Quiet
    }
}

/// Inputs for the breaking classification
#[derive(Debug, Clone)]
pub struct BreakingInput {
    pub counts: WindowCounts,
    pub metrics: TrendMetrics,
    pub tier_counts: TierCounts,
    pub source_count: u32,
    pub first_seen_at: DateTime<Utc>,
    /// Set by the quality scorer for suppressed evergreen labels
    pub evergreen_suppressed: bool,
}

/// Breaking status: velocity, corroboration and absolute volume must all
/// clear their thresholds, the event must still be inside its recency
/// window, and suppressed evergreen labels never qualify.
pub fn classify_breaking(
    input: &BreakingInput,
    config: &DetectionConfig,
    now: DateTime<Utc>,
) -> bool {
    if input.evergreen_suppressed {
        return false;
    }
    if input.counts.count_24h < config.min_mentions_breakthrough {
        return false;
    }
    if input.metrics.velocity < config.min_spike_ratio {
        return false;
    }
    if input.metrics.velocity_score < config.min_velocity_score {
        return false;
    }
    // requires tier-1 or tier-2 corroboration
    if input.tier_counts.tier1 == 0 && input.tier_counts.tier2 == 0 {
        return false;
    }
    if input.source_count < config.min_source_count {
        return false;
    }
    // a trend cannot be breaking indefinitely
    let age = now - input.first_seen_at;
    if age > Duration::hours(config.trend_window_hours as i64) {
        return false;
    }
    true
}

/// Trending status: sustained volume with corroboration
pub fn is_trending(
    counts: &WindowCounts,
    source_count: u32,
    velocity_score: f64,
    config: &DetectionConfig,
) -> bool {
    counts.count_24h >= config.min_mentions_to_trend
        && source_count >= config.min_source_count
        && velocity_score >= config.min_velocity_score
}

/// Scan a lookback series of (hour, count) observations for anomalies.
///
/// Returns the observations whose z-score meets the threshold. An
/// unestablished baseline yields no anomalies.
pub fn detect_anomalies(
    observations: &[(DateTime<Utc>, u64)],
    baseline: &BaselineSnapshot,
    z_threshold: f64,
    config: &DetectionConfig,
) -> Vec<Anomaly> {
    if !baseline.is_established(config.baseline_min_data_points) {
        return Vec::new();
    }

    observations
        .iter()
        .filter_map(|&(timestamp, count)| {
            let z = z_score(count, baseline, config);
            (z >= z_threshold).then_some(Anomaly {
                timestamp,
                count,
                z_score: z,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn established_baseline(mean: f64, std_dev: f64) -> BaselineSnapshot {
        BaselineSnapshot {
            avg_hourly_mentions: mean,
            avg_daily_mentions: mean * 24.0,
            std_dev_hourly: std_dev,
            peak_mentions_24h: (mean * 24.0) as u64,
            data_points: 720,
        }
    }

    fn counts(c1h: u64, c6h: u64, c24h: u64) -> WindowCounts {
        WindowCounts {
            count_1h: c1h,
            count_6h: c6h,
            count_24h: c24h,
        }
    }

    #[test]
    fn test_velocity_ratio() {
        assert!((velocity(30.0, 10.0) - 3.0).abs() < 1e-9);
        // zero baseline yields a very large ratio instead of dividing by zero
        assert!(velocity(5.0, 0.0) > 1_000_000.0);
    }

    #[test]
    fn test_z_score_scenario() {
        // baseline 10/hour with std dev 2: 50 mentions is a 20-sigma event
        let config = DetectionConfig::default();
        let baseline = established_baseline(10.0, 2.0);

        let z_spike = z_score(50, &baseline, &config);
        assert!((z_spike - 20.0).abs() < 1e-9);
        assert!(z_spike >= config.anomaly_z_threshold);

        let z_normal = z_score(11, &baseline, &config);
        assert!((z_normal - 0.5).abs() < 1e-9);
        assert!(z_normal < config.anomaly_z_threshold);
    }

    #[test]
    fn test_z_score_std_floor() {
        // near-zero variance cannot manufacture an infinite z-score
        let config = DetectionConfig::default();
        let baseline = established_baseline(10.0, 1e-9);
        let z = z_score(20, &baseline, &config);
        // floor is 10% of mean = 1.0, so z = (20 - 10) / 1.0
        assert!((z - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_poisson_surprise_rewards_quiet_topics() {
        // +40 mentions on a mean-2 topic is far more surprising than on a
        // mean-40 topic
        let quiet = poisson_surprise(42, 2.0);
        let noisy = poisson_surprise(80, 40.0);
        assert!(quiet > noisy);
    }

    #[test]
    fn test_poisson_surprise_edge_cases() {
        assert_eq!(poisson_surprise(0, 10.0), 0.0);
        // zero baseline with activity saturates at the cap
        assert!(poisson_surprise(5, 0.0) > 20.0);
        // observing the mean is unsurprising
        assert!(poisson_surprise(10, 10.0) < 2.0);
    }

    #[test]
    fn test_acceleration_sign() {
        assert!(acceleration(5.0, 2.0) > 0.0); // still rising
        assert!(acceleration(2.0, 5.0) < 0.0); // past the peak
    }

    #[test]
    fn test_cross_source_requires_min_sources() {
        let config = DetectionConfig::default();
        let mut type_counts = BTreeMap::new();
        type_counts.insert(SourceType::Social, 500u64);

        // one noisy source type scores zero no matter the volume
        assert_eq!(cross_source_score(&type_counts, &config), 0.0);

        type_counts.insert(SourceType::News, 3);
        let score = cross_source_score(&type_counts, &config);
        assert!(score > 0.0 && score <= 1.0);
    }

    #[test]
    fn test_cross_source_counts_types_not_volume() {
        let config = DetectionConfig::default();
        let mut few = BTreeMap::new();
        few.insert(SourceType::News, 2u64);
        few.insert(SourceType::Press, 1u64);

        let mut many = BTreeMap::new();
        many.insert(SourceType::News, 2000u64);
        many.insert(SourceType::Press, 1000u64);

        assert_eq!(
            cross_source_score(&few, &config),
            cross_source_score(&many, &config)
        );
    }

    #[test]
    fn test_classify_insufficient_baseline() {
        let config = DetectionConfig::default();
        let empty = BaselineSnapshot::default();

        assert_eq!(
            classify(&counts(3, 5, 8), &empty, &config),
            BurstClass::Unclassified
        );
        assert_eq!(
            classify(&counts(30, 60, 120), &empty, &config),
            BurstClass::Breakthrough
        );
    }

    #[test]
    fn test_classify_spike() {
        let config = DetectionConfig::default();
        let baseline = established_baseline(10.0, 2.0);
        assert_eq!(
            classify(&counts(50, 90, 200), &baseline, &config),
            BurstClass::Spike
        );
        assert_eq!(
            classify(&counts(11, 60, 230), &baseline, &config),
            BurstClass::Quiet
        );
    }

    #[test]
    fn test_breaking_requires_source_count() {
        let config = DetectionConfig::default();
        let now = Utc::now();
        let input = BreakingInput {
            counts: counts(40, 120, 300),
            metrics: TrendMetrics {
                velocity: 8.0,
                velocity_score: 6.0,
                ..Default::default()
            },
            tier_counts: TierCounts {
                tier1: 5,
                tier2: 0,
                tier3: 0,
            },
            source_count: 1,
            first_seen_at: now - Duration::hours(3),
            evergreen_suppressed: false,
        };

        // single-source echo chamber never breaks, regardless of velocity
        assert!(!classify_breaking(&input, &config, now));

        let corroborated = BreakingInput {
            source_count: 2,
            ..input
        };
        assert!(classify_breaking(&corroborated, &config, now));
    }

    #[test]
    fn test_breaking_expires_with_age() {
        let config = DetectionConfig::default();
        let now = Utc::now();
        let input = BreakingInput {
            counts: counts(40, 120, 300),
            metrics: TrendMetrics {
                velocity: 8.0,
                velocity_score: 6.0,
                ..Default::default()
            },
            tier_counts: TierCounts {
                tier1: 5,
                tier2: 2,
                tier3: 0,
            },
            source_count: 3,
            first_seen_at: now - Duration::hours(72),
            evergreen_suppressed: false,
        };
        assert!(!classify_breaking(&input, &config, now));
    }

    #[test]
    fn test_breaking_requires_tier_corroboration() {
        let config = DetectionConfig::default();
        let now = Utc::now();
        let input = BreakingInput {
            counts: counts(40, 120, 300),
            metrics: TrendMetrics {
                velocity: 8.0,
                velocity_score: 6.0,
                ..Default::default()
            },
            tier_counts: TierCounts {
                tier1: 0,
                tier2: 0,
                tier3: 40,
            },
            source_count: 3,
            first_seen_at: now - Duration::hours(2),
            evergreen_suppressed: false,
        };
        assert!(!classify_breaking(&input, &config, now));
    }

    #[test]
    fn test_evergreen_suppression_beats_velocity() {
        let config = DetectionConfig::default();
        let now = Utc::now();
        let input = BreakingInput {
            counts: counts(40, 90, 95),
            metrics: TrendMetrics {
                velocity: 50.0,
                velocity_score: 9.0,
                ..Default::default()
            },
            tier_counts: TierCounts {
                tier1: 10,
                tier2: 5,
                tier3: 0,
            },
            source_count: 4,
            first_seen_at: now - Duration::hours(1),
            evergreen_suppressed: true,
        };
        assert!(!classify_breaking(&input, &config, now));
    }

    #[test]
    fn test_detect_anomalies() {
        let config = DetectionConfig::default();
        let baseline = established_baseline(10.0, 2.0);
        let now = Utc::now();
        let observations = vec![
            (now - Duration::hours(3), 11u64),
            (now - Duration::hours(2), 50u64),
            (now - Duration::hours(1), 9u64),
        ];

        let anomalies = detect_anomalies(&observations, &baseline, 3.0, &config);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].count, 50);
        assert!(anomalies[0].z_score > 3.0);
    }

    #[test]
    fn test_detect_anomalies_unestablished_baseline() {
        let config = DetectionConfig::default();
        let baseline = BaselineSnapshot::default();
        let now = Utc::now();
        let observations = vec![(now, 1000u64)];
        assert!(detect_anomalies(&observations, &baseline, 3.0, &config).is_empty());
    }

    proptest! {
        #[test]
        fn prop_velocity_monotone_in_current(a in 0u64..5000, b in 0u64..5000, baseline in 0.1f64..100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let v_lo = velocity(lo as f64, baseline);
            let v_hi = velocity(hi as f64, baseline);
            prop_assert!(v_lo <= v_hi);
        }

        #[test]
        fn prop_velocity_score_bounded(v in 0.0f64..1e6, z in -1e3f64..1e6, s in 0.0f64..1e3) {
            let weights = ScoringWeights::default();
            let score = velocity_score(v, z, s, &weights);
            let max = weights.component_cap
                * (weights.velocity_weight + weights.z_score_weight + weights.surprise_weight);
            prop_assert!(score >= 0.0);
            prop_assert!(score <= max + 1e-9);
        }

        #[test]
        fn prop_cross_source_bounded(news in 0u64..100, social in 0u64..100, press in 0u64..100) {
            let config = DetectionConfig::default();
            let mut type_counts = BTreeMap::new();
            if news > 0 { type_counts.insert(SourceType::News, news); }
            if social > 0 { type_counts.insert(SourceType::Social, social); }
            if press > 0 { type_counts.insert(SourceType::Press, press); }
            let score = cross_source_score(&type_counts, &config);
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
