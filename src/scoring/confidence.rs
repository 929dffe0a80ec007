//! Confidence composite
//!
//! Confidence answers "how sure are we this trend is real", bounded [0, 1]:
//! - evidence volume with diminishing returns (log scale)
//! - source-tier diversity; tier-3-only evidence is capped below a ceiling
//! - corroboration across distinct independent domains
//! - exponential recency decay on the hours since last evidence

use crate::config::ScoringWeights;
use crate::models::TierCounts;

/// Raw inputs for one confidence computation
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInput {
    pub evidence_count: u64,
    pub tier_counts: TierCounts,
    pub distinct_domains: u64,
    pub hours_since_last_seen: f64,
}

/// Compute the bounded confidence composite.
///
/// Deterministic; strictly decreasing in `hours_since_last_seen` whenever
/// any evidence exists.
pub fn compute_confidence(input: &ConfidenceInput, weights: &ScoringWeights) -> f64 {
    if input.evidence_count == 0 {
        return 0.0;
    }

    let evidence_factor = ((1 + input.evidence_count) as f64).ln()
        / ((1 + weights.evidence_saturation) as f64).ln();
    let evidence_factor = evidence_factor.min(1.0);

    let diversity_factor = tier_diversity(&input.tier_counts);

    let corroboration_factor = (input.distinct_domains.min(weights.corroboration_saturation))
        as f64
        / weights.corroboration_saturation.max(1) as f64;

    let mut raw = weights.evidence_weight * evidence_factor
        + weights.diversity_weight * diversity_factor
        + weights.corroboration_weight * corroboration_factor;

    if input.tier_counts.is_tier3_only() {
        raw = raw.min(weights.tier3_ceiling);
    }

    let decay = 0.5_f64.powf(input.hours_since_last_seen.max(0.0) / weights.confidence_half_life_hours);

    (raw * decay).clamp(0.0, 1.0)
}

/// Average authority of the evidence mix, rescaled to [0, 1].
///
/// All tier-1 evidence scores 1.0; all tier-3 scores 0.0; blends land in
/// between according to their weighted share.
fn tier_diversity(tiers: &TierCounts) -> f64 {
    let total = tiers.total();
    if total == 0 {
        return 0.0;
    }
    let weighted =
        tiers.tier1 as f64 * 1.0 + tiers.tier2 as f64 * 0.6 + tiers.tier3 as f64 * 0.3;
    let avg = weighted / total as f64;
    // avg ranges over [0.3, 1.0]
    ((avg - 0.3) / 0.7).clamp(0.0, 1.0)
}
