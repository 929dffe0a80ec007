//! SQLite repository implementation
//!
//! One bundled-SQLite database holds evidence, trend events, baselines, org
//! scores, pass-run records and clusterer state. Rows carry a serde_json
//! payload column plus the few columns that queries filter or sort on;
//! timestamps used in range scans are stored as unix milliseconds.
//!
//! A single `Mutex<Connection>` serializes all access, which is the chosen
//! per-key locking strategy: updates to one event key are trivially
//! serialized, and batch passes partition keys across workers before they
//! ever reach storage.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
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

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS evidence (
    id              TEXT PRIMARY KEY,
    event_key       TEXT NOT NULL,
    content_hash    TEXT NOT NULL,
    source_type     TEXT NOT NULL,
    published_ms    INTEGER NOT NULL,
    payload         TEXT NOT NULL,
    UNIQUE(content_hash, source_type)
);
CREATE INDEX IF NOT EXISTS idx_evidence_event_time
    ON evidence(event_key, published_ms);

CREATE TABLE IF NOT EXISTS trend_events (
    event_key       TEXT PRIMARY KEY,
    stage           TEXT NOT NULL,
    last_seen_ms    INTEGER NOT NULL,
    payload         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_trend_events_stage ON trend_events(stage);

CREATE TABLE IF NOT EXISTS baselines (
    topic           TEXT PRIMARY KEY,
    payload         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS org_scores (
    organization_id TEXT NOT NULL,
    event_key       TEXT NOT NULL,
    expires_ms      INTEGER NOT NULL,
    payload         TEXT NOT NULL,
    PRIMARY KEY (organization_id, event_key)
);

CREATE TABLE IF NOT EXISTS pass_runs (
    run_id          TEXT PRIMARY KEY,
    started_ms      INTEGER NOT NULL,
    completed_ms    INTEGER,
    status          TEXT NOT NULL,
    detail          TEXT
);

CREATE TABLE IF NOT EXISTS cluster_state (
    name            TEXT PRIMARY KEY,
    payload         TEXT NOT NULL
);
"#;

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if necessary) the database at `path`
    pub fn open(path: &Path, busy_timeout_ms: u64) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, busy_timeout_ms)
    }

    /// Open an ephemeral in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, 1000)
    }

    fn init(conn: Connection, busy_timeout_ms: u64) -> StoreResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", busy_timeout_ms as i64)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl EvidenceRepository for SqliteStore {
    fn evidence_exists(&self, content_hash: &str, source_type: SourceType) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM evidence WHERE content_hash = ?1 AND source_type = ?2 LIMIT 1",
                params![content_hash, source_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn evidence_for_event(&self, event_key: &str) -> StoreResult<Vec<MentionEvidence>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM evidence WHERE event_key = ?1 ORDER BY published_ms ASC",
        )?;
        let rows = stmt.query_map(params![event_key], |row| row.get::<_, String>(0))?;

        let mut evidence = Vec::new();
        for payload in rows {
            evidence.push(serde_json::from_str(&payload?)?);
        }
        Ok(evidence)
    }

    fn count_evidence_between(
        &self,
        event_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM evidence
             WHERE event_key = ?1 AND published_ms >= ?2 AND published_ms < ?3",
            params![event_key, from.timestamp_millis(), to.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl TrendEventRepository for SqliteStore {
    fn get_event(&self, event_key: &str) -> StoreResult<Option<TrendEvent>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM trend_events WHERE event_key = ?1",
                params![event_key],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn list_active_events(&self, filter: &TrendFilter) -> StoreResult<Vec<TrendEvent>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT payload FROM trend_events WHERE stage != 'archived'")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut events = Vec::new();
        for payload in rows {
            let event: TrendEvent = serde_json::from_str(&payload?)?;
            if filter.matches(&event) {
                events.push(event);
            }
        }
        drop(stmt);
        drop(conn);

        super::sort_and_truncate(&mut events, filter);
        Ok(events)
    }

    fn save_event(&self, event: &TrendEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        upsert_event(&conn, event)?;
        Ok(())
    }

    fn persist_event_update(
        &self,
        event: &TrendEvent,
        evidence: &MentionEvidence,
        baseline: &TopicBaseline,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO evidence
                 (id, event_key, content_hash, source_type, published_ms, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                evidence.id.to_string(),
                event.event_key,
                evidence.content_hash,
                evidence.source_type.as_str(),
                evidence.published_at.timestamp_millis(),
                serde_json::to_string(evidence)?,
            ],
        )?;

        upsert_event(&tx, event)?;

        tx.execute(
            "INSERT OR REPLACE INTO baselines (topic, payload) VALUES (?1, ?2)",
            params![baseline.topic, serde_json::to_string(baseline)?],
        )?;

        tx.commit()?;
        Ok(())
    }
}

fn upsert_event(conn: &Connection, event: &TrendEvent) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO trend_events (event_key, stage, last_seen_ms, payload)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            event.event_key,
            event.trend_stage.as_str(),
            event.last_seen_at.timestamp_millis(),
            serde_json::to_string(event)?,
        ],
    )?;
    Ok(())
}

impl BaselineRepository for SqliteStore {
    fn get_baseline(&self, topic: &str) -> StoreResult<Option<TopicBaseline>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM baselines WHERE topic = ?1",
                params![topic],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl OrgScoreRepository for SqliteStore {
    fn get_org_score(&self, org_id: &str, event_key: &str) -> StoreResult<Option<OrgTrendScore>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM org_scores WHERE organization_id = ?1 AND event_key = ?2",
                params![org_id, event_key],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn list_org_scores(&self, org_id: &str) -> StoreResult<Vec<OrgTrendScore>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT payload FROM org_scores WHERE organization_id = ?1")?;
        let rows = stmt.query_map(params![org_id], |row| row.get::<_, String>(0))?;

        let mut scores: Vec<OrgTrendScore> = Vec::new();
        for payload in rows {
            scores.push(serde_json::from_str(&payload?)?);
        }
        scores.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(scores)
    }

    fn save_org_score(&self, score: &OrgTrendScore) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO org_scores
                 (organization_id, event_key, expires_ms, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                score.organization_id,
                score.event_key,
                score.expires_at.timestamp_millis(),
                serde_json::to_string(score)?,
            ],
        )?;
        Ok(())
    }
}

impl PassRunRepository for SqliteStore {
    fn run_completed(&self, run_id: &Uuid) -> StoreResult<bool> {
        let conn = self.conn()?;
        let completed: Option<Option<i64>> = conn
            .query_row(
                "SELECT completed_ms FROM pass_runs WHERE run_id = ?1",
                params![run_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(matches!(completed, Some(Some(_))))
    }

    fn record_run(&self, record: &PassRunRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO pass_runs
                 (run_id, started_ms, completed_ms, status, detail)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.run_id.to_string(),
                record.started_at.timestamp_millis(),
                record.completed_at.map(|t| t.timestamp_millis()),
                record.status,
                record.detail,
            ],
        )?;
        Ok(())
    }
}

impl ClusterStateRepository for SqliteStore {
    fn load_phrase_clusters(&self) -> StoreResult<Option<PhraseClusterer>> {
        let conn = self.conn()?;
        load_cluster_state(&conn, "phrase")
    }

    fn save_phrase_clusters(&self, clusterer: &PhraseClusterer) -> StoreResult<()> {
        let conn = self.conn()?;
        save_cluster_state(&conn, "phrase", &serde_json::to_string(clusterer)?)
    }

    fn load_semantic_clusters(&self) -> StoreResult<Option<SemanticClusterer>> {
        let conn = self.conn()?;
        load_cluster_state(&conn, "semantic")
    }

    fn save_semantic_clusters(&self, clusterer: &SemanticClusterer) -> StoreResult<()> {
        let conn = self.conn()?;
        save_cluster_state(&conn, "semantic", &serde_json::to_string(clusterer)?)
    }
}

fn load_cluster_state<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    name: &str,
) -> StoreResult<Option<T>> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM cluster_state WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    match payload {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn save_cluster_state(conn: &Connection, name: &str, payload: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO cluster_state (name, payload) VALUES (?1, ?2)",
        params![name, payload],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn evidence(hash: &str) -> MentionEvidence {
        MentionEvidence {
            id: Uuid::new_v4(),
            source_type: SourceType::News,
            source_tier: crate::models::SourceTier::Tier1,
            canonical_url: "https://example.com/a".to_string(),
            domain: "example.com".to_string(),
            content_hash: hash.to_string(),
            labels: vec!["Test Story".to_string()],
            entity_type: EntityType::Event,
            geographies: vec![],
            published_at: Utc::now(),
            observed_at: Utc::now(),
            sentiment_score: None,
            weight: 1.0,
            is_primary: true,
            topic_vector: None,
        }
    }

    #[test]
    fn test_persist_and_read_back() {
        let s = store();
        let now = Utc::now();
        let event = TrendEvent::new("test-story", "Test Story", EntityType::Event, now);
        let ev = evidence("hash-1");
        let baseline = TopicBaseline::new("test-story", now);

        s.persist_event_update(&event, &ev, &baseline).unwrap();

        assert!(s.evidence_exists("hash-1", SourceType::News).unwrap());
        assert!(!s.evidence_exists("hash-1", SourceType::Social).unwrap());
        assert!(s.get_event("test-story").unwrap().is_some());
        assert!(s.get_baseline("test-story").unwrap().is_some());
        assert_eq!(s.evidence_for_event("test-story").unwrap().len(), 1);
    }

    #[test]
    fn test_count_evidence_window() {
        let s = store();
        let now = Utc::now();
        let event = TrendEvent::new("k", "K", EntityType::Topic, now);
        let baseline = TopicBaseline::new("k", now);

        let mut old = evidence("old");
        old.published_at = now - chrono::Duration::hours(30);
        s.persist_event_update(&event, &old, &baseline).unwrap();

        let fresh = evidence("fresh");
        s.persist_event_update(&event, &fresh, &baseline).unwrap();

        let last_24h = s
            .count_evidence_between("k", now - chrono::Duration::hours(24), now + chrono::Duration::minutes(1))
            .unwrap();
        assert_eq!(last_24h, 1);
    }

    #[test]
    fn test_run_idempotency_records() {
        let s = store();
        let run_id = Uuid::new_v4();
        assert!(!s.run_completed(&run_id).unwrap());

        s.record_run(&PassRunRecord {
            run_id,
            started_at: Utc::now(),
            completed_at: None,
            status: "running".to_string(),
            detail: None,
        })
        .unwrap();
        assert!(!s.run_completed(&run_id).unwrap());

        s.record_run(&PassRunRecord {
            run_id,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            status: "completed".to_string(),
            detail: None,
        })
        .unwrap();
        assert!(s.run_completed(&run_id).unwrap());
    }

    #[test]
    fn test_cluster_state_roundtrip() {
        let s = store();
        assert!(s.load_phrase_clusters().unwrap().is_none());

        let mut clusterer = PhraseClusterer::new(0.6);
        clusterer.assign("a phrase", 1.0, Utc::now());
        s.save_phrase_clusters(&clusterer).unwrap();

        let restored = s.load_phrase_clusters().unwrap().unwrap();
        assert_eq!(restored.len(), 1);
        assert!(restored.cluster_of("a phrase").is_some());
    }
}
