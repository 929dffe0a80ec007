//! Prometheus metrics for the pado engine
//!
//! Call `init_metrics()` once at startup. If registration fails (or is never
//! attempted, as in most unit tests), every recording helper is a no-op;
//! the engine never fails because observability did.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Container for all engine metrics
struct EngineMetrics {
    evidence_ingested: CounterVec,
    evidence_duplicates: CounterVec,
    evidence_rejected: CounterVec,
    pass_duration: HistogramVec,
    pass_deferred: CounterVec,
    org_scores_computed: CounterVec,
    active_trends: Gauge,
    breaking_trends: Gauge,
}

static METRICS: OnceLock<EngineMetrics> = OnceLock::new();
static INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Register all metrics. Idempotent; later calls are no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    INIT_ATTEMPTED.set(true).ok();

    let metrics = EngineMetrics {
        evidence_ingested: register_counter_vec!(
            "pado_evidence_ingested_total",
            "Evidence records applied, by source type",
            &["source_type"]
        )?,
        evidence_duplicates: register_counter_vec!(
            "pado_evidence_duplicates_total",
            "Evidence records skipped as re-deliveries, by source type",
            &["source_type"]
        )?,
        evidence_rejected: register_counter_vec!(
            "pado_evidence_rejected_total",
            "Evidence records dropped at validation, by reason",
            &["reason"]
        )?,
        pass_duration: register_histogram_vec!(
            "pado_pass_duration_seconds",
            "Batch pass duration in seconds",
            &["pass"],
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )?,
        pass_deferred: register_counter_vec!(
            "pado_pass_deferred_keys_total",
            "Keys deferred to the next cycle after a pass deadline",
            &["pass"]
        )?,
        org_scores_computed: register_counter_vec!(
            "pado_org_scores_computed_total",
            "Org relevance scores computed, by organization",
            &["organization"]
        )?,
        active_trends: register_gauge!(
            "pado_active_trends",
            "Trend events currently in an active stage"
        )?,
        breaking_trends: register_gauge!(
            "pado_breaking_trends",
            "Trend events currently classified breaking"
        )?,
    };

    METRICS.set(metrics).ok();
    Ok(())
}

pub fn record_evidence_ingested(source_type: &str) {
    if let Some(m) = METRICS.get() {
        m.evidence_ingested.with_label_values(&[source_type]).inc();
    }
}

pub fn record_evidence_duplicate(source_type: &str) {
    if let Some(m) = METRICS.get() {
        m.evidence_duplicates
            .with_label_values(&[source_type])
            .inc();
    }
}

pub fn record_evidence_rejected(reason: &str) {
    if let Some(m) = METRICS.get() {
        m.evidence_rejected.with_label_values(&[reason]).inc();
    }
}

pub fn record_pass_duration(pass: &str, seconds: f64) {
    if let Some(m) = METRICS.get() {
        m.pass_duration.with_label_values(&[pass]).observe(seconds);
    }
}

pub fn record_pass_deferred(pass: &str, count: usize) {
    if let Some(m) = METRICS.get() {
        m.pass_deferred
            .with_label_values(&[pass])
            .inc_by(count as f64);
    }
}

pub fn record_org_score(organization: &str) {
    if let Some(m) = METRICS.get() {
        m.org_scores_computed
            .with_label_values(&[organization])
            .inc();
    }
}

pub fn set_trend_gauges(active: usize, breaking: usize) {
    if let Some(m) = METRICS.get() {
        m.active_trends.set(active as f64);
        m.breaking_trends.set(breaking as f64);
    }
}

/// Encode the default registry in Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_are_safe_without_init() {
        // recording before init must not panic
        record_evidence_ingested("news");
        record_pass_duration("ingest", 0.1);
        set_trend_gauges(3, 1);
    }

    #[test]
    fn test_init_and_gather() {
        init_metrics().unwrap();
        // second init is a no-op
        init_metrics().unwrap();

        record_evidence_ingested("news");
        record_evidence_rejected("missing_timestamp");

        let text = gather();
        assert!(text.contains("pado_evidence_ingested_total"));
    }
}
