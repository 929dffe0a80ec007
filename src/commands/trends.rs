//! `pado trends` - query active trend events

use anyhow::Result;

use crate::config::Config;
use crate::models::TrendStage;
use crate::store::TrendFilter;

pub async fn execute(
    config: &Config,
    breaking: bool,
    trending: bool,
    stage: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let store = super::open_store(config)?;

    let stage = match stage {
        Some(s) => Some(
            TrendStage::parse(&s)
                .ok_or_else(|| anyhow::anyhow!("unknown trend stage: {s}"))?,
        ),
        None => None,
    };

    let filter = TrendFilter {
        stage,
        breaking_only: breaking,
        trending_only: trending,
        min_confidence: None,
        limit: Some(limit),
    };

    let events = store.active_trends(&filter)?;
    let projections: Vec<_> = events.iter().map(|e| e.projection()).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&projections)?);
        return Ok(());
    }

    if projections.is_empty() {
        println!("No active trends");
        return Ok(());
    }

    println!(
        "{:<40} {:<10} {:>6} {:>8} {:>6} {:>5} {:>5}",
        "label", "stage", "1h", "velocity", "conf", "brk", "trnd"
    );
    for p in &projections {
        println!(
            "{:<40} {:<10} {:>6} {:>8.2} {:>6.2} {:>5} {:>5}",
            truncate(&p.canonical_label, 40),
            p.trend_stage.as_str(),
            p.current_1h,
            p.velocity,
            p.confidence_score,
            if p.is_breaking { "yes" } else { "-" },
            if p.is_trending { "yes" } else { "-" },
        );
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
