//! Configuration management for the pado engine
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Detection thresholds and scoring weights are
//! explicit configuration, never hard-coded in the scoring functions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::SourceType;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Burst detection thresholds
    pub detection: DetectionConfig,

    /// Confidence/velocity composite weights
    pub scoring: ScoringWeights,

    /// Org relevance projection settings
    pub projector: ProjectorConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Batch pass settings
    pub pipeline: PipelineConfig,

    /// Query API server
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Thresholds governing trend/burst classification.
///
/// Every field here is part of the recognized configuration surface and may
/// be overridden per organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum 24h mentions before an event can be classified trending
    pub min_mentions_to_trend: u64,

    /// Minimum 24h mentions before an event can be classified breaking
    pub min_mentions_breakthrough: u64,

    /// Minimum velocity ratio (current rate / baseline rate) for a spike
    pub min_spike_ratio: f64,

    /// Minimum composite velocity score for trending/breaking
    pub min_velocity_score: f64,

    /// Minimum distinct source types required for corroborated classification
    pub min_source_count: u32,

    /// Trailing window for baseline statistics, in days
    pub baseline_window_days: u32,

    /// Floor on baseline std dev, as a percentage of the mean. Guards the
    /// z-score against near-zero variance on quiet topics.
    pub baseline_min_deviation_pct: f64,

    /// Minimum hourly data points before a baseline supports classification
    pub baseline_min_data_points: u64,

    /// A trend can only be breaking while first_seen_at is within this window
    pub trend_window_hours: u32,

    /// Short window used for the previous-velocity comparison
    pub spike_window_hours: u32,

    /// Per-source-type contribution multipliers
    pub source_weights: HashMap<String, f64>,

    /// Suppress evergreen single-word topics from breaking classification
    pub suppress_evergreen: bool,

    /// 24h volume above which even evergreen topics may surface as breaking
    pub evergreen_volume_override: u64,

    /// Perennial topics that should never page as breaking at normal volume
    pub evergreen_topics: Vec<String>,

    /// Token-overlap similarity needed to join a phrase cluster
    pub similarity_threshold: f64,

    /// Cosine similarity needed to join a semantic cluster
    pub semantic_threshold: f64,

    /// Z-score at or above which an observation counts as anomalous
    pub anomaly_z_threshold: f64,

    /// Hours without evidence before declining becomes stale
    pub stale_after_hours: u32,

    /// Hours without evidence before stale becomes archived
    pub archive_after_hours: u32,

    /// Fraction of peak 1h count below which trending/peaked turns declining
    pub decline_fraction_of_peak: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let mut source_weights = HashMap::new();
        source_weights.insert("news".to_string(), 1.0);
        source_weights.insert("press".to_string(), 0.9);
        source_weights.insert("legislative".to_string(), 0.8);
        source_weights.insert("social".to_string(), 0.6);

        Self {
            min_mentions_to_trend: 10,
            min_mentions_breakthrough: 25,
            min_spike_ratio: 3.0,
            min_velocity_score: 2.0,
            min_source_count: 2,
            baseline_window_days: 30,
            baseline_min_deviation_pct: 10.0,
            baseline_min_data_points: 24,
            trend_window_hours: 24,
            spike_window_hours: 6,
            source_weights,
            suppress_evergreen: true,
            evergreen_volume_override: 100,
            evergreen_topics: vec![
                "congress".to_string(),
                "economy".to_string(),
                "inflation".to_string(),
                "election".to_string(),
                "taxes".to_string(),
                "healthcare".to_string(),
                "immigration".to_string(),
                "climate".to_string(),
            ],
            similarity_threshold: 0.6,
            semantic_threshold: 0.85,
            anomaly_z_threshold: 3.0,
            stale_after_hours: 48,
            archive_after_hours: 168,
            decline_fraction_of_peak: 0.5,
        }
    }
}

impl DetectionConfig {
    /// Contribution weight for a source type (1.0 when unconfigured)
    pub fn source_weight(&self, source_type: SourceType) -> f64 {
        self.source_weights
            .get(source_type.as_str())
            .copied()
            .unwrap_or(1.0)
    }

    /// Effective std dev floor for a given baseline mean
    pub fn std_dev_floor(&self, mean: f64) -> f64 {
        mean * self.baseline_min_deviation_pct / 100.0
    }
}

/// Weights for the composite velocity score and the confidence formula.
///
/// These are documented defaults, not a recovered ground truth; tune per
/// deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Velocity-score mix (applied to capped velocity / z-score / surprise)
    pub velocity_weight: f64,
    pub z_score_weight: f64,
    pub surprise_weight: f64,

    /// Cap applied to each velocity-score input before mixing
    pub component_cap: f64,

    /// Confidence mix (evidence volume / tier diversity / domain corroboration)
    pub evidence_weight: f64,
    pub diversity_weight: f64,
    pub corroboration_weight: f64,

    /// Evidence count at which the log-scaled volume factor saturates
    pub evidence_saturation: u64,

    /// Distinct domains at which the corroboration factor saturates
    pub corroboration_saturation: u64,

    /// Ceiling on confidence when evidence is tier-3 only
    pub tier3_ceiling: f64,

    /// Multiplier applied to confidence for penalized evergreen labels
    pub evergreen_penalty: f64,

    /// Half-life, in hours, of the confidence recency decay
    pub confidence_half_life_hours: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            velocity_weight: 0.5,
            z_score_weight: 0.3,
            surprise_weight: 0.2,
            component_cap: 10.0,
            evidence_weight: 0.4,
            diversity_weight: 0.3,
            corroboration_weight: 0.3,
            evidence_saturation: 50,
            corroboration_saturation: 5,
            tier3_ceiling: 0.6,
            evergreen_penalty: 0.5,
            confidence_half_life_hours: 24.0,
        }
    }
}

/// Org relevance projection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    /// TTL for computed org scores, in hours
    pub score_ttl_hours: u32,

    /// Confidence delta that counts as a material trend change
    pub confidence_delta_threshold: f64,

    /// Relevance mix across match kinds
    pub entity_match_weight: f64,
    pub topic_match_weight: f64,
    pub geography_match_weight: f64,

    /// Path to the TOML file holding organization profiles
    pub profiles_path: PathBuf,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            score_ttl_hours: 6,
            confidence_delta_threshold: 0.1,
            entity_match_weight: 0.6,
            topic_match_weight: 0.3,
            geography_match_weight: 0.1,
            profiles_path: PathBuf::from("config/orgs.toml"),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/pado.db"),
            busy_timeout_ms: 5000,
        }
    }
}

/// Batch pass settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-pass time budget in seconds; keys left over defer to the next run
    pub pass_deadline_secs: u64,

    /// Tolerance for published_at timestamps in the future, in minutes
    pub future_tolerance_mins: i64,

    /// Interval between scheduled cycles for the `run` command, in seconds
    pub cycle_interval_secs: u64,

    /// Directory watched for incoming batch files
    pub spool_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pass_deadline_secs: 30,
            future_tolerance_mins: 10,
            cycle_interval_secs: 300,
            spool_dir: PathBuf::from("data/spool"),
        }
    }
}

/// Query API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the read-only query API
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<u64>("PADO_MIN_MENTIONS_TO_TREND") {
            config.detection.min_mentions_to_trend = v;
        }
        if let Some(v) = env_parse::<u64>("PADO_MIN_MENTIONS_BREAKTHROUGH") {
            config.detection.min_mentions_breakthrough = v;
        }
        if let Some(v) = env_parse::<f64>("PADO_MIN_SPIKE_RATIO") {
            config.detection.min_spike_ratio = v;
        }
        if let Some(v) = env_parse::<f64>("PADO_MIN_VELOCITY_SCORE") {
            config.detection.min_velocity_score = v;
        }
        if let Some(v) = env_parse::<u32>("PADO_MIN_SOURCE_COUNT") {
            config.detection.min_source_count = v;
        }
        if let Some(v) = env_parse::<u32>("PADO_BASELINE_WINDOW_DAYS") {
            config.detection.baseline_window_days = v;
        }
        if let Some(v) = env_parse::<u32>("PADO_TREND_WINDOW_HOURS") {
            config.detection.trend_window_hours = v;
        }
        if let Some(v) = env_parse::<u32>("PADO_SPIKE_WINDOW_HOURS") {
            config.detection.spike_window_hours = v;
        }
        if let Some(v) = env_parse::<bool>("PADO_SUPPRESS_EVERGREEN") {
            config.detection.suppress_evergreen = v;
        }
        if let Some(v) = env_parse::<u64>("PADO_EVERGREEN_VOLUME_OVERRIDE") {
            config.detection.evergreen_volume_override = v;
        }

        if let Ok(path) = std::env::var("PADO_SQLITE_PATH") {
            config.storage.sqlite_path = path.into();
        }
        if let Ok(path) = std::env::var("PADO_ORG_PROFILES") {
            config.projector.profiles_path = path.into();
        }
        if let Ok(addr) = std::env::var("PADO_BIND_ADDR") {
            config.server.bind_addr = addr;
        }
        if let Ok(level) = std::env::var("PADO_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("PADO_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        if d.min_spike_ratio <= 0.0 {
            anyhow::bail!("min_spike_ratio must be positive");
        }
        if d.min_source_count == 0 {
            anyhow::bail!("min_source_count must be greater than 0");
        }
        if d.baseline_window_days == 0 {
            anyhow::bail!("baseline_window_days must be greater than 0");
        }
        if !(0.0..=1.0).contains(&d.similarity_threshold) {
            anyhow::bail!("similarity_threshold must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&d.semantic_threshold) {
            anyhow::bail!("semantic_threshold must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&d.decline_fraction_of_peak) {
            anyhow::bail!("decline_fraction_of_peak must be within [0, 1]");
        }
        if d.archive_after_hours <= d.stale_after_hours {
            anyhow::bail!("archive_after_hours must exceed stale_after_hours");
        }
        for (key, weight) in &d.source_weights {
            if SourceType::parse(key).is_none() {
                anyhow::bail!("unknown source type in source_weights: {key}");
            }
            if *weight < 0.0 {
                anyhow::bail!("source weight for {key} must be non-negative");
            }
        }

        let w = &self.scoring;
        let confidence_mix = w.evidence_weight + w.diversity_weight + w.corroboration_weight;
        if (confidence_mix - 1.0).abs() > 1e-6 {
            anyhow::bail!("confidence weights must sum to 1.0, got {confidence_mix}");
        }
        if !(0.0..=1.0).contains(&w.tier3_ceiling) {
            anyhow::bail!("tier3_ceiling must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&w.evergreen_penalty) {
            anyhow::bail!("evergreen_penalty must be within [0, 1]");
        }
        if w.confidence_half_life_hours <= 0.0 {
            anyhow::bail!("confidence_half_life_hours must be positive");
        }

        let p = &self.projector;
        let relevance_mix =
            p.entity_match_weight + p.topic_match_weight + p.geography_match_weight;
        if (relevance_mix - 1.0).abs() > 1e-6 {
            anyhow::bail!("relevance weights must sum to 1.0, got {relevance_mix}");
        }
        if p.score_ttl_hours == 0 {
            anyhow::bail!("score_ttl_hours must be greater than 0");
        }

        if self.pipeline.pass_deadline_secs == 0 {
            anyhow::bail!("pass_deadline_secs must be greater than 0");
        }

        Ok(())
    }

    /// Per-pass deadline as a Duration
    pub fn pass_deadline(&self) -> Duration {
        Duration::from_secs(self.pipeline.pass_deadline_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_weight_lookup() {
        let d = DetectionConfig::default();
        assert!(d.source_weight(SourceType::News) > d.source_weight(SourceType::Social));
        // unconfigured types fall back to 1.0
        let empty = DetectionConfig {
            source_weights: HashMap::new(),
            ..Default::default()
        };
        assert_eq!(empty.source_weight(SourceType::Social), 1.0);
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = Config::default();
        config.scoring.evidence_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_source_type() {
        let mut config = Config::default();
        config
            .detection
            .source_weights
            .insert("carrier_pigeon".to_string(), 1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_spike_ratio() {
        let mut config = Config::default();
        config.detection.min_spike_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            [detection]
            min_mentions_to_trend = 5
            min_spike_ratio = 2.5

            [logging]
            level = "debug"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.detection.min_mentions_to_trend, 5);
        assert!((config.detection.min_spike_ratio - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "debug");
        // unset sections fall back to defaults
        assert_eq!(config.detection.min_source_count, 2);
    }

    #[test]
    fn test_std_dev_floor() {
        let d = DetectionConfig::default();
        assert!((d.std_dev_floor(10.0) - 1.0).abs() < 1e-9);
        assert_eq!(d.std_dev_floor(0.0), 0.0);
    }
}
