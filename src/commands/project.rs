//! `pado project` - inspect or refresh one organization's relevance scores
//!
//! Reads follow the lazy-recompute contract: a score past its TTL (or whose
//! trend changed materially) is recomputed on the spot before display.

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::config::Config;
use crate::projector::Projector;
use crate::store::TrendFilter;

pub async fn execute(config: &Config, org_id: &str, json: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let repo = store.repo();
    let profiles = super::load_orgs(config);

    let org = profiles
        .iter()
        .find(|o| o.org_id == org_id)
        .ok_or_else(|| anyhow::anyhow!("unknown organization: {org_id}"))?;

    let projector = Projector::new(config.projector.clone());
    let now = Utc::now();
    let events = store.active_trends(&TrendFilter::default())?;

    // lazily refresh anything stale before reading it back
    let mut refreshed = 0usize;
    for event in &events {
        let existing = repo.get_org_score(org_id, &event.event_key)?;
        let fresh = existing
            .as_ref()
            .is_some_and(|s| !projector.needs_recompute(s, event, now));
        if fresh {
            continue;
        }
        if let Some(score) = projector.project(org, event, now) {
            repo.save_org_score(&score)?;
            refreshed += 1;
        }
    }
    if refreshed > 0 {
        info!(org_id, refreshed, "Recomputed stale org scores");
    }

    let scores = repo.list_org_scores(org_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scores)?);
        return Ok(());
    }

    if scores.is_empty() {
        println!("No relevant trends for {org_id}");
        return Ok(());
    }

    println!(
        "{:<40} {:>9} {:>8} {:<9} explanation",
        "event", "relevance", "urgency", "priority"
    );
    for score in &scores {
        println!(
            "{:<40} {:>9.2} {:>8.2} {:<9} {}",
            score.event_key,
            score.relevance_score,
            score.urgency_score,
            score.priority_bucket.as_str(),
            score.explanation.summary,
        );
    }

    Ok(())
}
