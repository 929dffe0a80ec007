//! Evidence normalization and validation
//!
//! First stage of the pipeline. Raw mention records from upstream collectors
//! are validated, canonicalized and deduplicated here:
//! - Required-field validation (timestamp, content, labels)
//! - Canonical URL computation with tracking parameters stripped
//! - SHA256 content hashing for the dedupe key
//! - Stable ordering by `published_at` so downstream velocity math sees
//!   evidence for one key in timestamp order
//!
//! Rejected records are dropped with a logged reason, never silently.

mod dedup;
mod url;

pub use dedup::DedupFilter;
pub use url::canonicalize_url;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::DetectionConfig;
use crate::models::{EntityType, MentionEvidence, NewEvidence};

/// Errors raised when incoming evidence is malformed or unacceptable
#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("published_at is required")]
    MissingTimestamp,

    #[error("published_at {published_at} is more than {tolerance_mins}min in the future")]
    FutureTimestamp {
        published_at: DateTime<Utc>,
        tolerance_mins: i64,
    },

    #[error("content is empty")]
    EmptyContent,

    #[error("no topic/entity labels supplied")]
    MissingLabels,

    #[error("sentiment score {0} outside [-1, 1]")]
    InvalidSentiment(f64),

    #[error("unparseable source URL: {0}")]
    InvalidUrl(String),
}

impl EvidenceError {
    /// Stable reason code for metrics labels
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingTimestamp => "missing_timestamp",
            Self::FutureTimestamp { .. } => "future_timestamp",
            Self::EmptyContent => "empty_content",
            Self::MissingLabels => "missing_labels",
            Self::InvalidSentiment(_) => "invalid_sentiment",
            Self::InvalidUrl(_) => "invalid_url",
        }
    }
}

/// Result of normalizing one batch
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// Valid evidence, stably sorted by `published_at`
    pub evidence: Vec<MentionEvidence>,

    /// Rejected records with the reason each was dropped
    pub rejected: Vec<(NewEvidence, EvidenceError)>,
}

impl NormalizedBatch {
    pub fn accepted_count(&self) -> usize {
        self.evidence.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Validates and canonicalizes raw mention records
pub struct Normalizer {
    future_tolerance: Duration,
    detection: DetectionConfig,
}

impl Normalizer {
    pub fn new(detection: DetectionConfig, future_tolerance_mins: i64) -> Self {
        Self {
            future_tolerance: Duration::minutes(future_tolerance_mins),
            detection,
        }
    }

    /// Validate and canonicalize a single raw record.
    ///
    /// The contribution weight is the configured source-type weight scaled by
    /// the tier authority weight, so one tier-1 news item outweighs several
    /// tier-3 social posts.
    pub fn normalize(
        &self,
        raw: &NewEvidence,
        now: DateTime<Utc>,
    ) -> Result<MentionEvidence, EvidenceError> {
        let published_at = raw.published_at.ok_or(EvidenceError::MissingTimestamp)?;

        if published_at > now + self.future_tolerance {
            return Err(EvidenceError::FutureTimestamp {
                published_at,
                tolerance_mins: self.future_tolerance.num_minutes(),
            });
        }

        if raw.content.trim().is_empty() {
            return Err(EvidenceError::EmptyContent);
        }

        let labels: Vec<String> = raw
            .labels
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if labels.is_empty() {
            return Err(EvidenceError::MissingLabels);
        }

        if let Some(s) = raw.sentiment_score {
            if !s.is_finite() || !(-1.0..=1.0).contains(&s) {
                return Err(EvidenceError::InvalidSentiment(s));
            }
        }

        let (canonical_url, domain) = canonicalize_url(&raw.source_url)?;

        let source_tier = raw.source_tier.unwrap_or_default();
        let weight = self.detection.source_weight(raw.source_type) * source_tier.authority_weight();

        Ok(MentionEvidence {
            id: Uuid::new_v4(),
            source_type: raw.source_type,
            source_tier,
            canonical_url,
            domain,
            content_hash: crate::models::content_hash(&raw.content),
            labels,
            entity_type: raw.entity_type.unwrap_or(EntityType::Other),
            geographies: raw.geographies.clone(),
            published_at,
            observed_at: now,
            sentiment_score: raw.sentiment_score,
            weight,
            is_primary: false,
            topic_vector: raw.topic_vector.clone(),
        })
    }

    /// Normalize a whole batch, partitioning into accepted and rejected.
    ///
    /// Accepted evidence comes out stably sorted by `published_at`; the sort
    /// must not reorder equal timestamps across the batch.
    pub fn normalize_batch(
        &self,
        batch: Vec<NewEvidence>,
        now: DateTime<Utc>,
    ) -> NormalizedBatch {
        let mut result = NormalizedBatch::default();

        for raw in batch {
            match self.normalize(&raw, now) {
                Ok(evidence) => result.evidence.push(evidence),
                Err(reason) => {
                    warn!(
                        source_url = %raw.source_url,
                        source_type = %raw.source_type,
                        %reason,
                        "Dropping invalid evidence"
                    );
                    result.rejected.push((raw, reason));
                }
            }
        }

        result.evidence.sort_by_key(|e| e.published_at);
        result
    }
}
