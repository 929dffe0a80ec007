//! CLI command implementations
//!
//! Each subcommand is a thin async wrapper over the library: build a store
//! and pipeline from configuration, do the work, print the result.

pub mod ingest;
pub mod project;
pub mod run;
pub mod serve;
pub mod trends;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::models::NewEvidence;
use crate::pipeline::Pipeline;
use crate::projector::{load_profiles, OrgProfile};
use crate::store::{Repository, SqliteStore, TrendStore};

/// Open the configured SQLite store
pub(crate) fn open_store(config: &Config) -> Result<TrendStore> {
    let repo: Arc<dyn Repository> = Arc::new(
        SqliteStore::open(
            &config.storage.sqlite_path,
            config.storage.busy_timeout_ms,
        )
        .with_context(|| {
            format!(
                "Failed to open database at {}",
                config.storage.sqlite_path.display()
            )
        })?,
    );
    Ok(TrendStore::new(repo, config))
}

/// Load org profiles, tolerating a missing file (no orgs yet)
pub(crate) fn load_orgs(config: &Config) -> Vec<OrgProfile> {
    match load_profiles(&config.projector.profiles_path) {
        Ok(profiles) => profiles,
        Err(reason) => {
            warn!(
                path = %config.projector.profiles_path.display(),
                %reason,
                "No organization profiles loaded"
            );
            Vec::new()
        }
    }
}

/// Build a full pipeline from configuration
pub(crate) fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let store = open_store(config)?;
    let profiles = load_orgs(config);
    Ok(Pipeline::new(store, config, profiles))
}

/// Parse a JSON Lines batch file of raw mention records
pub(crate) fn read_batch(path: &Path) -> Result<Vec<NewEvidence>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;

    let mut batch = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: NewEvidence = serde_json::from_str(line)
            .with_context(|| format!("Invalid mention record at line {}", line_no + 1))?;
        batch.push(record);
    }
    Ok(batch)
}

/// Derive a stable run id from batch content, so retrying the same file
/// reuses the same idempotency key
pub(crate) fn run_id_for_batch(content: &[u8]) -> Uuid {
    let digest = Sha256::digest(content);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_is_stable() {
        let a = run_id_for_batch(b"same content");
        let b = run_id_for_batch(b"same content");
        let c = run_id_for_batch(b"other content");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_read_batch_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.jsonl");
        std::fs::write(
            &path,
            r#"{"source_type":"news","source_url":"https://example.com/a","content":"body","labels":["Story"],"published_at":"2026-08-06T12:00:00Z"}

{"source_type":"social","source_url":"https://example.com/b","content":"post","labels":["Story"],"published_at":"2026-08-06T12:05:00Z"}
"#,
        )
        .unwrap();

        let batch = read_batch(&path).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].labels, vec!["Story"]);
    }

    #[test]
    fn test_read_batch_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        assert!(read_batch(&path).is_err());
    }
}
