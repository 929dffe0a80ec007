//! Confidence and label-quality scoring
//!
//! Annotates canonical trend events after the burst metrics are computed:
//! a bounded [0, 1] confidence composite, a label quality classification,
//! and the evergreen suppression decision. Every function here is
//! deterministic given identical inputs (no hidden state, no randomness),
//! so the pipeline stays reproducible.

mod confidence;
mod quality;

pub use confidence::{compute_confidence, ConfidenceInput};
pub use quality::{classify_label, evergreen_suppressed, is_evergreen};

use crate::config::{DetectionConfig, ScoringWeights};
use crate::models::{EntityType, LabelQuality, TierCounts};

/// Combined scorer verdict for one event update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOutcome {
    pub confidence: f64,
    pub label_quality: LabelQuality,
    /// When true, the event is excluded from breaking classification
    pub evergreen_suppressed: bool,
}

/// Score one event: classify the label, decide evergreen suppression, then
/// compute confidence (with the evergreen penalty applied to penalized
/// labels).
#[allow(clippy::too_many_arguments)]
pub fn score_event(
    canonical_label: &str,
    entity_type: EntityType,
    evidence_count: u64,
    tier_counts: TierCounts,
    distinct_domains: u64,
    count_24h: u64,
    hours_since_last_seen: f64,
    detection: &DetectionConfig,
    weights: &ScoringWeights,
) -> ScoreOutcome {
    let label_quality = classify_label(canonical_label, entity_type);
    let suppressed = evergreen_suppressed(canonical_label, label_quality, count_24h, detection);

    let input = ConfidenceInput {
        evidence_count,
        tier_counts,
        distinct_domains,
        hours_since_last_seen,
    };
    let mut confidence = compute_confidence(&input, weights);

    if suppressed {
        confidence *= weights.evergreen_penalty;
    }

    ScoreOutcome {
        confidence: confidence.clamp(0.0, 1.0),
        label_quality,
        evergreen_suppressed: suppressed,
    }
}
