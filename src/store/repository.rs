//! Repository traits for the trend event store
//!
//! Business logic never talks to a database directly: the pipeline and the
//! query surface work against these traits, with a SQLite implementation for
//! production and an in-memory implementation for tests and ephemeral runs.
//!
//! `persist_event_update` is the one compound write: the evidence row, the
//! recomputed event and its baseline land atomically, so a trend event is
//! never observable with fresh counts but stale metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{StoreResult, TrendFilter};
use crate::baseline::TopicBaseline;
use crate::clustering::{PhraseClusterer, SemanticClusterer};
use crate::models::{MentionEvidence, SourceType, TrendEvent};
use crate::projector::OrgTrendScore;

/// Record of one logical pipeline run, keyed by its idempotency id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassRunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// completed | degraded | failed
    pub status: String,

    pub detail: Option<String>,
}

/// Evidence rows: immutable once written
pub trait EvidenceRepository: Send + Sync {
    /// Authoritative dedupe check on (content_hash, source_type)
    fn evidence_exists(&self, content_hash: &str, source_type: SourceType) -> StoreResult<bool>;

    /// All evidence attached to an event, in published_at order
    fn evidence_for_event(&self, event_key: &str) -> StoreResult<Vec<MentionEvidence>>;

    /// Count evidence for an event within [from, to)
    fn count_evidence_between(
        &self,
        event_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<u64>;
}

/// Trend event rows
pub trait TrendEventRepository: Send + Sync {
    fn get_event(&self, event_key: &str) -> StoreResult<Option<TrendEvent>>;

    /// Snapshot of non-archived events matching the filter, at call time
    fn list_active_events(&self, filter: &TrendFilter) -> StoreResult<Vec<TrendEvent>>;

    /// Persist an event mutation that carries no new evidence (lifecycle sweeps)
    fn save_event(&self, event: &TrendEvent) -> StoreResult<()>;

    /// Atomically persist one ingestion: new evidence row, updated event,
    /// updated baseline
    fn persist_event_update(
        &self,
        event: &TrendEvent,
        evidence: &MentionEvidence,
        baseline: &TopicBaseline,
    ) -> StoreResult<()>;
}

/// Per-topic baselines
pub trait BaselineRepository: Send + Sync {
    fn get_baseline(&self, topic: &str) -> StoreResult<Option<TopicBaseline>>;
}

/// Per-(organization, event) relevance scores
pub trait OrgScoreRepository: Send + Sync {
    fn get_org_score(&self, org_id: &str, event_key: &str) -> StoreResult<Option<OrgTrendScore>>;

    fn list_org_scores(&self, org_id: &str) -> StoreResult<Vec<OrgTrendScore>>;

    fn save_org_score(&self, score: &OrgTrendScore) -> StoreResult<()>;
}

/// Idempotency records for batch passes
pub trait PassRunRepository: Send + Sync {
    /// Whether this run id already completed (re-running it must be a no-op)
    fn run_completed(&self, run_id: &Uuid) -> StoreResult<bool>;

    fn record_run(&self, record: &PassRunRecord) -> StoreResult<()>;
}

/// Persisted clusterer state, carried between pipeline cycles
pub trait ClusterStateRepository: Send + Sync {
    fn load_phrase_clusters(&self) -> StoreResult<Option<PhraseClusterer>>;

    fn save_phrase_clusters(&self, clusterer: &PhraseClusterer) -> StoreResult<()>;

    fn load_semantic_clusters(&self) -> StoreResult<Option<SemanticClusterer>>;

    fn save_semantic_clusters(&self, clusterer: &SemanticClusterer) -> StoreResult<()>;
}

/// Everything a full engine deployment needs from storage
pub trait Repository:
    EvidenceRepository
    + TrendEventRepository
    + BaselineRepository
    + OrgScoreRepository
    + PassRunRepository
    + ClusterStateRepository
{
}

impl<T> Repository for T where
    T: EvidenceRepository
        + TrendEventRepository
        + BaselineRepository
        + OrgScoreRepository
        + PassRunRepository
        + ClusterStateRepository
{
}
