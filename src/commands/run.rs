//! `pado run` - scheduled batch processing loop
//!
//! Watches the spool directory for `.jsonl` batch files dropped by upstream
//! collectors. Each interval tick processes every pending file through one
//! pipeline cycle and renames it `.done`, so a crash mid-cycle leaves the
//! file in place for the retry (the content-derived run id makes the retry
//! a safe re-run).

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::utils::{with_retry, RetryConfig};

pub async fn execute(config: &Config) -> Result<()> {
    let spool = config.pipeline.spool_dir.clone();
    std::fs::create_dir_all(&spool)
        .with_context(|| format!("Failed to create spool dir: {}", spool.display()))?;

    let pipeline = super::build_pipeline(config)?;

    let mut ticker = interval(Duration::from_secs(config.pipeline.cycle_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        spool = %spool.display(),
        interval_secs = config.pipeline.cycle_interval_secs,
        "Scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(reason) = drain_spool(&pipeline, &spool).await {
                    error!(%reason, "Cycle failed; will retry next tick");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

/// Process every pending batch file in the spool directory
async fn drain_spool(pipeline: &Pipeline, spool: &PathBuf) -> Result<()> {
    let mut pending: Vec<PathBuf> = std::fs::read_dir(spool)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    pending.sort();

    for path in pending {
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(reason) => {
                warn!(file = %path.display(), %reason, "Skipping unreadable batch file");
                continue;
            }
        };
        let run_id = super::run_id_for_batch(&raw);
        let batch = match super::read_batch(&path) {
            Ok(batch) => batch,
            Err(reason) => {
                warn!(file = %path.display(), %reason, "Skipping malformed batch file");
                continue;
            }
        };

        let retry = RetryConfig::default();
        let report = with_retry(
            &retry,
            || {
                let batch = batch.clone();
                async move { pipeline.run_cycle(batch, run_id, Utc::now()) }
            },
            |e| e.is_recoverable(),
        )
        .await?;

        info!(
            file = %path.display(),
            %run_id,
            degraded = report.is_degraded(),
            already_completed = report.already_completed,
            "Batch processed"
        );

        let done = path.with_extension("jsonl.done");
        if let Err(reason) = std::fs::rename(&path, &done) {
            warn!(file = %path.display(), %reason, "Failed to mark batch done");
        }
    }

    Ok(())
}
