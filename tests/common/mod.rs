//! Shared fixtures for integration tests
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::sync::Arc;

use pado::config::Config;
use pado::models::{EntityType, NewEvidence, SourceTier, SourceType};
use pado::pipeline::Pipeline;
use pado::projector::{OrgProfile, TopicAffinity, WatchEntity};
use pado::store::{MemoryStore, TrendStore};

/// Config with thresholds small enough for hand-built fixtures
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.detection.baseline_min_data_points = 2;
    config.detection.min_mentions_to_trend = 3;
    config.detection.min_mentions_breakthrough = 5;
    config
}

/// Pipeline over an in-memory store
pub fn test_pipeline(config: &Config, profiles: Vec<OrgProfile>) -> Pipeline {
    let store = TrendStore::new(Arc::new(MemoryStore::new()), config);
    Pipeline::new(store, config, profiles)
}

/// A tier-1 news mention with one label
pub fn mention(
    content: &str,
    url: &str,
    label: &str,
    published_at: DateTime<Utc>,
) -> NewEvidence {
    NewEvidence {
        source_type: SourceType::News,
        source_url: url.to_string(),
        content: content.to_string(),
        labels: vec![label.to_string()],
        entity_type: Some(EntityType::Event),
        published_at: Some(published_at),
        sentiment_score: None,
        source_tier: Some(SourceTier::Tier1),
        geographies: vec![],
        topic_vector: None,
    }
}

/// Same mention shape from a different source type/tier
pub fn social_mention(
    content: &str,
    url: &str,
    label: &str,
    published_at: DateTime<Utc>,
) -> NewEvidence {
    NewEvidence {
        source_type: SourceType::Social,
        source_tier: Some(SourceTier::Tier3),
        ..mention(content, url, label, published_at)
    }
}

/// An org watching "Jane Doe" and healthcare
pub fn health_coalition() -> OrgProfile {
    OrgProfile {
        org_id: "org-health".to_string(),
        name: "Civic Health Coalition".to_string(),
        watchlist: vec![WatchEntity {
            name: "Jane Doe".to_string(),
            aliases: vec!["Rep. Doe".to_string()],
            weight: 1.0,
        }],
        topics: vec![TopicAffinity {
            topic: "healthcare".to_string(),
            weight: 0.8,
        }],
        geographies: vec!["springfield".to_string()],
        allowlist: Vec::new(),
        blocklist: Vec::new(),
    }
}
