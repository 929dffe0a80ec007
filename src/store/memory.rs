//! In-memory repository implementation
//!
//! Used by the test suite and for ephemeral runs. Semantics mirror the
//! SQLite implementation; "transactions" are writes under one lock guard.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use super::repository::{
    BaselineRepository, ClusterStateRepository, EvidenceRepository, OrgScoreRepository,
    PassRunRecord, PassRunRepository, TrendEventRepository,
};
use super::{StoreError, StoreResult, TrendFilter};
use crate::baseline::TopicBaseline;
use crate::clustering::{PhraseClusterer, SemanticClusterer};
use crate::models::{MentionEvidence, SourceType, TrendEvent};
use crate::projector::OrgTrendScore;

#[derive(Default)]
struct MemoryInner {
    dedup_keys: HashSet<(String, SourceType)>,
    evidence: HashMap<String, Vec<MentionEvidence>>,
    events: HashMap<String, TrendEvent>,
    baselines: HashMap<String, TopicBaseline>,
    org_scores: HashMap<(String, String), OrgTrendScore>,
    runs: HashMap<Uuid, PassRunRecord>,
    cluster_state: HashMap<String, String>,
}

/// In-memory store backed by hash maps behind one RwLock
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, MemoryInner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, MemoryInner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl EvidenceRepository for MemoryStore {
    fn evidence_exists(&self, content_hash: &str, source_type: SourceType) -> StoreResult<bool> {
        Ok(self
            .read()?
            .dedup_keys
            .contains(&(content_hash.to_string(), source_type)))
    }

    fn evidence_for_event(&self, event_key: &str) -> StoreResult<Vec<MentionEvidence>> {
        let inner = self.read()?;
        let mut rows = inner.evidence.get(event_key).cloned().unwrap_or_default();
        rows.sort_by_key(|e| e.published_at);
        Ok(rows)
    }

    fn count_evidence_between(
        &self,
        event_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let inner = self.read()?;
        Ok(inner
            .evidence
            .get(event_key)
            .map(|rows| {
                rows.iter()
                    .filter(|e| e.published_at >= from && e.published_at < to)
                    .count() as u64
            })
            .unwrap_or(0))
    }
}

impl TrendEventRepository for MemoryStore {
    fn get_event(&self, event_key: &str) -> StoreResult<Option<TrendEvent>> {
        Ok(self.read()?.events.get(event_key).cloned())
    }

    fn list_active_events(&self, filter: &TrendFilter) -> StoreResult<Vec<TrendEvent>> {
        let inner = self.read()?;
        let mut events: Vec<TrendEvent> = inner
            .events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        drop(inner);

        super::sort_and_truncate(&mut events, filter);
        Ok(events)
    }

    fn save_event(&self, event: &TrendEvent) -> StoreResult<()> {
        self.write()?
            .events
            .insert(event.event_key.clone(), event.clone());
        Ok(())
    }

    fn persist_event_update(
        &self,
        event: &TrendEvent,
        evidence: &MentionEvidence,
        baseline: &TopicBaseline,
    ) -> StoreResult<()> {
        let mut inner = self.write()?;
        inner
            .dedup_keys
            .insert((evidence.content_hash.clone(), evidence.source_type));
        inner
            .evidence
            .entry(event.event_key.clone())
            .or_default()
            .push(evidence.clone());
        inner.events.insert(event.event_key.clone(), event.clone());
        inner
            .baselines
            .insert(baseline.topic.clone(), baseline.clone());
        Ok(())
    }
}

impl BaselineRepository for MemoryStore {
    fn get_baseline(&self, topic: &str) -> StoreResult<Option<TopicBaseline>> {
        Ok(self.read()?.baselines.get(topic).cloned())
    }
}

impl OrgScoreRepository for MemoryStore {
    fn get_org_score(&self, org_id: &str, event_key: &str) -> StoreResult<Option<OrgTrendScore>> {
        Ok(self
            .read()?
            .org_scores
            .get(&(org_id.to_string(), event_key.to_string()))
            .cloned())
    }

    fn list_org_scores(&self, org_id: &str) -> StoreResult<Vec<OrgTrendScore>> {
        let inner = self.read()?;
        let mut scores: Vec<OrgTrendScore> = inner
            .org_scores
            .values()
            .filter(|s| s.organization_id == org_id)
            .cloned()
            .collect();
        scores.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(scores)
    }

    fn save_org_score(&self, score: &OrgTrendScore) -> StoreResult<()> {
        self.write()?.org_scores.insert(
            (score.organization_id.clone(), score.event_key.clone()),
            score.clone(),
        );
        Ok(())
    }
}

impl PassRunRepository for MemoryStore {
    fn run_completed(&self, run_id: &Uuid) -> StoreResult<bool> {
        Ok(self
            .read()?
            .runs
            .get(run_id)
            .is_some_and(|r| r.completed_at.is_some()))
    }

    fn record_run(&self, record: &PassRunRecord) -> StoreResult<()> {
        self.write()?.runs.insert(record.run_id, record.clone());
        Ok(())
    }
}

impl ClusterStateRepository for MemoryStore {
    fn load_phrase_clusters(&self) -> StoreResult<Option<PhraseClusterer>> {
        match self.read()?.cluster_state.get("phrase") {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn save_phrase_clusters(&self, clusterer: &PhraseClusterer) -> StoreResult<()> {
        let json = serde_json::to_string(clusterer)?;
        self.write()?.cluster_state.insert("phrase".to_string(), json);
        Ok(())
    }

    fn load_semantic_clusters(&self) -> StoreResult<Option<SemanticClusterer>> {
        match self.read()?.cluster_state.get("semantic") {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn save_semantic_clusters(&self, clusterer: &SemanticClusterer) -> StoreResult<()> {
        let json = serde_json::to_string(clusterer)?;
        self.write()?
            .cluster_state
            .insert("semantic".to_string(), json);
        Ok(())
    }
}
