//! Trend event store and lifecycle
//!
//! The store owns the only mutable shared state in the engine: trend events
//! and their baselines. `apply_evidence` is the transactional heart of
//! ingestion: dedupe check, baseline read-modify-write, windowed count
//! recomputation, metric/score refresh and stage transition all land in one
//! atomic persist, so an event is never observable with fresh counts but
//! stale velocity.
//!
//! `advance_lifecycle` is the sweep half: as time passes without evidence,
//! windowed counts decay, confidence decays, and events walk the stage
//! machine toward archival (archived events stay queryable, never deleted).

mod memory;
mod repository;
mod sqlite;

pub use memory::MemoryStore;
pub use repository::{
    BaselineRepository, ClusterStateRepository, EvidenceRepository, OrgScoreRepository,
    PassRunRecord, PassRunRepository, Repository, TrendEventRepository,
};
pub use sqlite::SqliteStore;

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::baseline::{BaselineEstimator, TopicBaseline};
use crate::config::Config;
use crate::config::{DetectionConfig, ScoringWeights};
use crate::models::{
    MentionEvidence, SourceType, TrendEvent, TrendStage, WindowCounts,
};
use crate::scoring;
use crate::velocity::{self, BreakingInput};

/// Errors raised by the storage layer. Database failures are the one fatal
/// error class in the engine: the enclosing batch pass retries via its
/// idempotency key.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn is_recoverable(&self) -> bool {
        // transient database contention is retried; the rest are bugs or
        // corrupted state
        matches!(self, Self::Database(_) | Self::Io(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filter for active-trend queries
#[derive(Debug, Clone, Default)]
pub struct TrendFilter {
    pub stage: Option<TrendStage>,
    pub breaking_only: bool,
    pub trending_only: bool,
    pub min_confidence: Option<f64>,
    pub limit: Option<usize>,
}

impl TrendFilter {
    pub fn matches(&self, event: &TrendEvent) -> bool {
        if !event.trend_stage.is_active() {
            return false;
        }
        if let Some(stage) = self.stage {
            if event.trend_stage != stage {
                return false;
            }
        }
        if self.breaking_only && !event.is_breaking {
            return false;
        }
        if self.trending_only && !event.is_trending {
            return false;
        }
        if let Some(min) = self.min_confidence {
            if event.confidence_score < min {
                return false;
            }
        }
        true
    }
}

/// Deterministic ordering for trend listings: breaking first, then by
/// velocity score, then key for stability
pub(crate) fn sort_and_truncate(events: &mut Vec<TrendEvent>, filter: &TrendFilter) {
    events.sort_by(|a, b| {
        b.is_breaking
            .cmp(&a.is_breaking)
            .then(
                b.metrics
                    .velocity_score
                    .partial_cmp(&a.metrics.velocity_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then_with(|| a.event_key.cmp(&b.event_key))
    });
    if let Some(limit) = filter.limit {
        events.truncate(limit);
    }
}

/// Result of one evidence upsert
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    /// Re-delivered item; nothing changed
    Duplicate,
    /// Evidence applied
    Applied {
        event: Box<TrendEvent>,
        created: bool,
    },
}

impl UpsertOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// One stage transition observed during a lifecycle sweep
#[derive(Debug, Clone)]
pub struct StageTransition {
    pub event_key: String,
    pub from: TrendStage,
    pub to: TrendStage,
}

/// Facade over a [`Repository`] that owns upsert and lifecycle logic
pub struct TrendStore {
    repo: Arc<dyn Repository>,
    detection: DetectionConfig,
    weights: ScoringWeights,
    estimator: BaselineEstimator,
}

impl TrendStore {
    pub fn new(repo: Arc<dyn Repository>, config: &Config) -> Self {
        let estimator = BaselineEstimator::new(
            config.detection.baseline_window_days,
            config.detection.baseline_min_data_points,
        );
        Self {
            repo,
            detection: config.detection.clone(),
            weights: config.scoring.clone(),
            estimator,
        }
    }

    pub fn repo(&self) -> Arc<dyn Repository> {
        Arc::clone(&self.repo)
    }

    /// Apply one piece of evidence to its canonical event.
    ///
    /// Idempotent: a (content_hash, source_type) pair that already exists is
    /// reported as a duplicate and changes nothing.
    pub fn apply_evidence(
        &self,
        event_key: &str,
        canonical_label: &str,
        mut evidence: MentionEvidence,
        now: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome> {
        if self
            .repo
            .evidence_exists(&evidence.content_hash, evidence.source_type)?
        {
            debug!(
                content_hash = %evidence.content_hash,
                source_type = %evidence.source_type,
                "Duplicate evidence, skipping"
            );
            return Ok(UpsertOutcome::Duplicate);
        }

        let (mut event, created) = match self.repo.get_event(event_key)? {
            Some(event) => (event, false),
            None => (
                TrendEvent::new(
                    event_key,
                    canonical_label,
                    evidence.entity_type,
                    evidence.published_at,
                ),
                true,
            ),
        };

        evidence.is_primary = event.evidence_count == 0;

        // baseline read-modify-write: one mention in its published hour
        let mut baseline = match self.repo.get_baseline(event_key)? {
            Some(baseline) => baseline,
            None => TopicBaseline::new(event_key, now),
        };
        self.estimator
            .update_baseline(&mut baseline, 1, evidence.published_at, now);

        self.fold_evidence(&mut event, canonical_label, &evidence);

        event.counts = self.window_counts(event_key, now, Some(evidence.published_at))?;
        event.peak_count_1h = event.peak_count_1h.max(event.counts.count_1h);
        event.baseline = baseline.snapshot();

        self.recompute(&mut event, now, Some(evidence.published_at))?;
        self.advance_stage_on_ingest(&mut event);

        self.repo.persist_event_update(&event, &evidence, &baseline)?;

        Ok(UpsertOutcome::Applied {
            event: Box::new(event),
            created,
        })
    }

    pub fn get_event(&self, event_key: &str) -> StoreResult<Option<TrendEvent>> {
        self.repo.get_event(event_key)
    }

    /// Snapshot of active trends matching the filter
    pub fn active_trends(&self, filter: &TrendFilter) -> StoreResult<Vec<TrendEvent>> {
        self.repo.list_active_events(filter)
    }

    /// Walk every active event through time-driven decay and stage
    /// transitions. Returns the transitions taken.
    pub fn advance_lifecycle(&self, now: DateTime<Utc>) -> StoreResult<Vec<StageTransition>> {
        let mut transitions = Vec::new();

        for mut event in self.repo.list_active_events(&TrendFilter::default())? {
            let before = event.trend_stage;

            event.counts = self.window_counts(&event.event_key, now, None)?;
            self.recompute(&mut event, now, None)?;

            if let Some(next) = self.sweep_transition(&event, now) {
                if event.trend_stage.can_transition_to(next) {
                    info!(
                        event_key = %event.event_key,
                        from = %event.trend_stage,
                        to = %next,
                        "Trend stage transition"
                    );
                    event.trend_stage = next;
                }
            }

            self.repo.save_event(&event)?;

            if event.trend_stage != before {
                transitions.push(StageTransition {
                    event_key: event.event_key.clone(),
                    from: before,
                    to: event.trend_stage,
                });
            }
        }

        Ok(transitions)
    }

    /// Merge aggregate evidence facts into the event
    fn fold_evidence(
        &self,
        event: &mut TrendEvent,
        canonical_label: &str,
        evidence: &MentionEvidence,
    ) {
        // the phrase clusterer may have promoted a better representative
        event.canonical_label = canonical_label.to_string();

        for label in &evidence.labels {
            event.topics.insert(label.clone());
            if label != canonical_label {
                event.alias_variants.insert(label.clone());
            }
        }
        for geo in &evidence.geographies {
            event.geographies.insert(geo.clone());
        }

        event.source_types.insert(evidence.source_type);
        event.domains.insert(evidence.domain.clone());
        event.tier_counts.record(evidence.source_tier);
        event.evidence_count += 1;

        if let Some(sentiment) = evidence.sentiment_score {
            event.sentiment_samples += 1;
            let prev = event.avg_sentiment.unwrap_or(0.0);
            event.avg_sentiment =
                Some(prev + (sentiment - prev) / event.sentiment_samples as f64);
        }

        if event.topic_vector.is_none() {
            event.topic_vector = evidence.topic_vector.clone();
        }

        if evidence.published_at > event.last_seen_at {
            event.last_seen_at = evidence.published_at;
        }
        if evidence.published_at < event.first_seen_at {
            event.first_seen_at = evidence.published_at;
        }
    }

    /// Windowed counts from stored evidence, optionally including one
    /// not-yet-persisted timestamp
    fn window_counts(
        &self,
        event_key: &str,
        now: DateTime<Utc>,
        pending: Option<DateTime<Utc>>,
    ) -> StoreResult<WindowCounts> {
        // published_at may run slightly ahead of the clock (future
        // tolerance), so the upper bound is open-ended
        let upper = now + Duration::days(1);
        let count = |hours: i64| -> StoreResult<u64> {
            let from = now - Duration::hours(hours);
            let stored = self.repo.count_evidence_between(event_key, from, upper)?;
            let pending_hit = pending.map(|ts| ts >= from && ts < upper).unwrap_or(false);
            Ok(stored + u64::from(pending_hit))
        };

        Ok(WindowCounts {
            count_1h: count(1)?,
            count_6h: count(6)?,
            count_24h: count(24)?,
        })
    }

    /// Refresh metrics, scores and classification flags from current state
    fn recompute(
        &self,
        event: &mut TrendEvent,
        now: DateTime<Utc>,
        pending: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        // previous spike window, for acceleration
        let spike = Duration::hours(self.detection.spike_window_hours as i64);
        let prev_from = now - spike - Duration::hours(1);
        let prev_to = now - spike;
        let mut prev_1h = self
            .repo
            .count_evidence_between(&event.event_key, prev_from, prev_to)?;
        if let Some(ts) = pending {
            if ts >= prev_from && ts < prev_to {
                prev_1h += 1;
            }
        }
        let prev_velocity =
            velocity::velocity(prev_1h as f64, event.baseline.avg_hourly_mentions);

        let type_counts: BTreeMap<SourceType, u64> =
            event.source_types.iter().map(|&st| (st, 1)).collect();

        event.metrics = velocity::compute_metrics(
            &event.counts,
            prev_velocity,
            &event.baseline,
            &type_counts,
            &self.detection,
            &self.weights,
        );

        let age_hours = (now - event.last_seen_at).num_seconds().max(0) as f64 / 3600.0;
        let outcome = scoring::score_event(
            &event.canonical_label,
            event.entity_type,
            event.evidence_count,
            event.tier_counts,
            event.domains.len() as u64,
            event.counts.count_24h,
            age_hours,
            &self.detection,
            &self.weights,
        );
        event.confidence_score = outcome.confidence;
        event.label_quality = outcome.label_quality;

        event.is_breaking = velocity::classify_breaking(
            &BreakingInput {
                counts: event.counts,
                metrics: event.metrics,
                tier_counts: event.tier_counts,
                source_count: event.source_count(),
                first_seen_at: event.first_seen_at,
                evergreen_suppressed: outcome.evergreen_suppressed,
            },
            &self.detection,
            now,
        );
        event.is_trending = velocity::is_trending(
            &event.counts,
            event.source_count(),
            event.metrics.velocity_score,
            &self.detection,
        );

        Ok(())
    }

    /// Velocity above which a new (or re-ignited) topic counts as rising
    fn rising_threshold(&self) -> f64 {
        (self.detection.min_spike_ratio / 2.0).max(1.0)
    }

    /// Forward transitions taken at ingest time, including re-ignition
    fn advance_stage_on_ingest(&self, event: &mut TrendEvent) {
        use TrendStage::*;
        let next = match event.trend_stage {
            New if event.metrics.velocity >= self.rising_threshold() => Some(Rising),
            Rising if event.is_trending => Some(Trending),
            Trending
                if event.metrics.acceleration < 0.0
                    && event.metrics.velocity >= self.detection.min_spike_ratio =>
            {
                Some(Peaked)
            }
            // fresh evidence re-ignites a fading trend
            Declining | Stale if event.metrics.velocity >= self.rising_threshold() => {
                Some(Rising)
            }
            _ => None,
        };

        if let Some(next) = next {
            if event.trend_stage.can_transition_to(next) {
                event.trend_stage = next;
            }
        }
    }

    /// Time-driven transitions taken during a sweep
    fn sweep_transition(&self, event: &TrendEvent, now: DateTime<Utc>) -> Option<TrendStage> {
        use TrendStage::*;

        let idle = now - event.last_seen_at;
        let stale_after = Duration::hours(self.detection.stale_after_hours as i64);
        let archive_after = Duration::hours(self.detection.archive_after_hours as i64);
        let decline_floor =
            (event.peak_count_1h as f64 * self.detection.decline_fraction_of_peak) as u64;

        match event.trend_stage {
            New if event.metrics.velocity >= self.rising_threshold() => Some(Rising),
            Rising if event.is_trending => Some(Trending),
            Trending
                if event.metrics.acceleration < 0.0
                    && event.metrics.velocity >= self.detection.min_spike_ratio =>
            {
                Some(Peaked)
            }
            Peaked if event.counts.count_1h < decline_floor => Some(Declining),
            Declining if idle >= stale_after => Some(Stale),
            Stale if idle >= archive_after => Some(Archived),
            _ => None,
        }
    }
}
