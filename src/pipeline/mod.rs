//! Batch pass orchestration
//!
//! The engine runs as scheduled batch cycles, not per-event streaming. One
//! cycle takes a batch of raw mention records through the passes in order:
//!
//! 1. normalize: validate/canonicalize, stable-sort by published_at
//! 2. ingest: phrase-cluster each label, upsert evidence per event key
//! 3. lifecycle: time-driven decay and stage transitions
//! 4. semantic: group vectored events into semantic clusters
//! 5. project: recompute org relevance scores where material
//!
//! Every pass carries a deadline. Work left over when the budget runs out is
//! deferred to the next cycle and the pass reports degraded, not failed.
//! Partial-batch completion is acceptable; a stalled pipeline is not.
//!
//! Each cycle carries an idempotency key (`run_id`): re-running a completed
//! cycle is a detected no-op, which makes retry after a storage failure safe.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clustering::{PhraseClusterer, SemanticClusterer};
use crate::config::Config;
use crate::metrics;
use crate::models::{event_key_for_label, NewEvidence};
use crate::normalizer::{DedupFilter, Normalizer};
use crate::projector::{OrgProfile, Projector};
use crate::store::{PassRunRecord, StoreError, TrendFilter, TrendStore, UpsertOutcome};

/// Errors raised by pass orchestration
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A pass ran out of budget; the remainder retries next cycle
    #[error("pass '{pass}' exceeded its {budget_secs}s budget, {deferred} keys deferred")]
    StalePassSkipped {
        pass: String,
        budget_secs: u64,
        deferred: usize,
    },

    /// Storage failure; the whole cycle retries under the same run id
    #[error("storage failure in pass '{pass}': {source}")]
    PassFailed {
        pass: String,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::StalePassSkipped { .. } => true,
            Self::PassFailed { source, .. } => source.is_recoverable(),
        }
    }
}

/// How one pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    Completed,
    /// Deadline hit; some keys deferred to the next cycle
    Degraded,
    Skipped,
}

/// Outcome of a single pass
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub name: &'static str,
    pub status: PassStatus,
    pub processed: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub errors: usize,
    pub deferred: Vec<String>,
    pub duration: Duration,
}

impl PassOutcome {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            status: PassStatus::Completed,
            processed: 0,
            duplicates: 0,
            rejected: 0,
            errors: 0,
            deferred: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    fn finish(mut self, started: Instant, budget: Duration) -> Self {
        self.duration = started.elapsed();
        metrics::record_pass_duration(self.name, self.duration.as_secs_f64());
        if !self.deferred.is_empty() {
            self.status = PassStatus::Degraded;
            metrics::record_pass_deferred(self.name, self.deferred.len());
            let skipped = PipelineError::StalePassSkipped {
                pass: self.name.to_string(),
                budget_secs: budget.as_secs(),
                deferred: self.deferred.len(),
            };
            warn!(%skipped, "Pass degraded; deferred work retries next cycle");
        }
        self
    }
}

/// Report for one full cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub passes: Vec<PassOutcome>,

    /// True when the run id had already completed and nothing ran
    pub already_completed: bool,
}

impl CycleReport {
    pub fn is_degraded(&self) -> bool {
        self.passes
            .iter()
            .any(|p| p.status == PassStatus::Degraded)
    }
}

/// Orchestrates the batch passes over one store
pub struct Pipeline {
    store: TrendStore,
    normalizer: Normalizer,
    projector: Projector,
    profiles: Vec<OrgProfile>,
    phrase_threshold: f64,
    semantic_threshold: f64,
    pass_budget: Duration,
}

impl Pipeline {
    pub fn new(store: TrendStore, config: &Config, profiles: Vec<OrgProfile>) -> Self {
        Self {
            store,
            normalizer: Normalizer::new(
                config.detection.clone(),
                config.pipeline.future_tolerance_mins,
            ),
            projector: Projector::new(config.projector.clone()),
            profiles,
            phrase_threshold: config.detection.similarity_threshold,
            semantic_threshold: config.detection.semantic_threshold,
            pass_budget: config.pass_deadline(),
        }
    }

    pub fn store(&self) -> &TrendStore {
        &self.store
    }

    /// Run one full cycle over a batch of raw mention records.
    ///
    /// Safe to retry with the same `run_id`: a completed run is a no-op.
    pub fn run_cycle(
        &self,
        batch: Vec<NewEvidence>,
        run_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, PipelineError> {
        let repo = self.store.repo();

        if repo
            .run_completed(&run_id)
            .map_err(|source| fail("idempotency", source))?
        {
            info!(%run_id, "Cycle already completed, skipping");
            return Ok(CycleReport {
                run_id,
                passes: Vec::new(),
                already_completed: true,
            });
        }

        repo.record_run(&PassRunRecord {
            run_id,
            started_at: now,
            completed_at: None,
            status: "running".to_string(),
            detail: None,
        })
        .map_err(|source| fail("idempotency", source))?;

        let mut passes = Vec::new();

        // normalize
        let started = Instant::now();
        let mut outcome = PassOutcome::new("normalize");
        let normalized = self.normalizer.normalize_batch(batch, now);
        outcome.processed = normalized.accepted_count();
        outcome.rejected = normalized.rejected_count();
        for (_, reason) in &normalized.rejected {
            metrics::record_evidence_rejected(reason.reason());
        }
        passes.push(outcome.finish(started, self.pass_budget));

        passes.push(self.ingest_pass(normalized.evidence, now)?);
        passes.push(self.lifecycle_pass(now)?);
        passes.push(self.semantic_pass(now)?);
        passes.push(self.projection_pass(now)?);

        let degraded = passes.iter().any(|p| p.status == PassStatus::Degraded);
        repo.record_run(&PassRunRecord {
            run_id,
            started_at: now,
            completed_at: Some(Utc::now()),
            status: if degraded { "degraded" } else { "completed" }.to_string(),
            detail: None,
        })
        .map_err(|source| fail("idempotency", source))?;

        let report = CycleReport {
            run_id,
            passes,
            already_completed: false,
        };
        info!(
            %run_id,
            degraded = report.is_degraded(),
            "Cycle finished"
        );
        Ok(report)
    }

    /// Phrase-cluster labels and upsert evidence, in published_at order
    fn ingest_pass(
        &self,
        evidence: Vec<crate::models::MentionEvidence>,
        now: DateTime<Utc>,
    ) -> Result<PassOutcome, PipelineError> {
        let started = Instant::now();
        let mut outcome = PassOutcome::new("ingest");
        let repo = self.store.repo();

        let mut clusterer = repo
            .load_phrase_clusters()
            .map_err(|source| fail("ingest", source))?
            .unwrap_or_else(|| PhraseClusterer::new(self.phrase_threshold));
        let mut dedup = DedupFilter::new();

        let mut items = evidence.into_iter();
        while let Some(item) = items.next() {
            if started.elapsed() > self.pass_budget {
                warn!("Ingest pass over budget, deferring remainder");
                let mut deferred: Vec<String> = item.labels.first().cloned().into_iter().collect();
                deferred.extend(items.filter_map(|e| e.labels.first().cloned()));
                outcome.deferred = deferred;
                break;
            }

            let label = match item.primary_label() {
                Some(label) => label.to_string(),
                None => continue,
            };

            // bloom fast path: only a "maybe" pays for the store lookup
            if dedup.maybe_seen(&item.content_hash, item.source_type)
                && repo
                    .evidence_exists(&item.content_hash, item.source_type)
                    .map_err(|source| fail("ingest", source))?
            {
                outcome.duplicates += 1;
                metrics::record_evidence_duplicate(item.source_type.as_str());
                continue;
            }

            let assignment = clusterer.assign(&label, item.weight, now);
            let event_key = event_key_for_label(&assignment.representative);
            let source_type = item.source_type;
            let content_hash = item.content_hash.clone();

            match self
                .store
                .apply_evidence(&event_key, &assignment.representative, item, now)
                .map_err(|source| fail("ingest", source))?
            {
                UpsertOutcome::Duplicate => {
                    outcome.duplicates += 1;
                    metrics::record_evidence_duplicate(source_type.as_str());
                }
                UpsertOutcome::Applied { .. } => {
                    outcome.processed += 1;
                    metrics::record_evidence_ingested(source_type.as_str());
                }
            }
            dedup.insert(&content_hash, source_type);
        }

        repo.save_phrase_clusters(&clusterer)
            .map_err(|source| fail("ingest", source))?;

        Ok(outcome.finish(started, self.pass_budget))
    }

    fn lifecycle_pass(&self, now: DateTime<Utc>) -> Result<PassOutcome, PipelineError> {
        let started = Instant::now();
        let mut outcome = PassOutcome::new("lifecycle");

        let transitions = self
            .store
            .advance_lifecycle(now)
            .map_err(|source| fail("lifecycle", source))?;
        outcome.processed = transitions.len();

        let active = self
            .store
            .active_trends(&TrendFilter::default())
            .map_err(|source| fail("lifecycle", source))?;
        let breaking = active.iter().filter(|e| e.is_breaking).count();
        metrics::set_trend_gauges(active.len(), breaking);

        Ok(outcome.finish(started, self.pass_budget))
    }

    /// Group vectored events into semantic clusters and refresh aggregates
    fn semantic_pass(&self, now: DateTime<Utc>) -> Result<PassOutcome, PipelineError> {
        let started = Instant::now();
        let mut outcome = PassOutcome::new("semantic");
        let repo = self.store.repo();

        let mut clusterer = repo
            .load_semantic_clusters()
            .map_err(|source| fail("semantic", source))?
            .unwrap_or_else(|| SemanticClusterer::new(self.semantic_threshold));

        let events = self
            .store
            .active_trends(&TrendFilter::default())
            .map_err(|source| fail("semantic", source))?;

        let mut by_key = std::collections::HashMap::new();
        for event in &events {
            by_key.insert(event.event_key.clone(), event);
        }

        for event in &events {
            if started.elapsed() > self.pass_budget {
                warn!("Semantic pass over budget, deferring remainder");
                outcome.deferred.push(event.event_key.clone());
                continue;
            }
            let Some(vector) = &event.topic_vector else {
                continue;
            };

            match clusterer.assign(&event.event_key, vector, now) {
                Ok(cluster_id) => {
                    if event.semantic_cluster != Some(cluster_id) {
                        let mut updated = (*event).clone();
                        updated.semantic_cluster = Some(cluster_id);
                        repo.save_event(&updated)
                            .map_err(|source| fail("semantic", source))?;
                    }
                    outcome.processed += 1;
                }
                Err(reason) => {
                    // a malformed vector must not poison the pass
                    warn!(event_key = %event.event_key, %reason, "Semantic assignment failed");
                    outcome.errors += 1;
                }
            }
        }

        // refresh cluster aggregates from member metrics
        let cluster_ids: Vec<u32> = clusterer.iter().map(|c| c.id).collect();
        for id in cluster_ids {
            let (velocities, confidences): (Vec<f64>, Vec<f64>) = clusterer
                .get(id)
                .map(|c| {
                    c.member_keys
                        .iter()
                        .filter_map(|k| by_key.get(k))
                        .map(|e| (e.metrics.velocity, e.confidence_score))
                        .unzip()
                })
                .unwrap_or_default();
            if !velocities.is_empty() {
                clusterer.update_stats(id, &velocities, &confidences).ok();
            }
        }

        repo.save_semantic_clusters(&clusterer)
            .map_err(|source| fail("semantic", source))?;

        Ok(outcome.finish(started, self.pass_budget))
    }

    /// Recompute org scores where the trend changed materially or the TTL
    /// lapsed. One org's failure never aborts the others.
    fn projection_pass(&self, now: DateTime<Utc>) -> Result<PassOutcome, PipelineError> {
        let started = Instant::now();
        let mut outcome = PassOutcome::new("project");
        let repo = self.store.repo();

        let events = self
            .store
            .active_trends(&TrendFilter::default())
            .map_err(|source| fail("project", source))?;

        for org in &self.profiles {
            if started.elapsed() > self.pass_budget {
                warn!(org_id = %org.org_id, "Projection pass over budget, deferring org");
                outcome.deferred.push(org.org_id.clone());
                continue;
            }

            let result: Result<usize, StoreError> = (|| {
                let mut computed = 0usize;
                for event in &events {
                    let existing = repo.get_org_score(&org.org_id, &event.event_key)?;
                    let fresh_enough = existing
                        .as_ref()
                        .is_some_and(|s| !self.projector.needs_recompute(s, event, now));
                    if fresh_enough {
                        continue;
                    }
                    if let Some(score) = self.projector.project(org, event, now) {
                        repo.save_org_score(&score)?;
                        metrics::record_org_score(&org.org_id);
                        computed += 1;
                    }
                }
                Ok(computed)
            })();

            match result {
                Ok(computed) => outcome.processed += computed,
                Err(reason) => {
                    error!(org_id = %org.org_id, %reason, "Projection failed for organization");
                    outcome.errors += 1;
                }
            }
        }

        Ok(outcome.finish(started, self.pass_budget))
    }
}

fn fail(pass: &str, source: StoreError) -> PipelineError {
    PipelineError::PassFailed {
        pass: pass.to_string(),
        source,
    }
}
