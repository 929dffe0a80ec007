//! Org relevance projection
//!
//! Projects every active trend event onto each subscribing organization's
//! interest profile. The output is a per-(org, event) score with a
//! relevance/urgency split, a discretized priority bucket for alert routing,
//! and an explanation payload naming exactly which watchlist term, alias,
//! topic or geography matched; relevance decisions must be auditable, not
//! a black box.
//!
//! Explicit allow/deny overrides always beat the computed score. Scores
//! carry a TTL; consumers recompute lazily after expiry, and the pipeline
//! recomputes eagerly on material trend changes.

mod profile;

pub use profile::{load_profiles, OrgProfile, TopicAffinity, WatchEntity};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::config::ProjectorConfig;
use crate::models::{TrendEvent, TrendStage};

/// Errors raised while loading or applying org profiles
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to read profiles from {path}: {source}")]
    ProfileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profiles: {0}")]
    ProfileParse(#[source] Box<toml::de::Error>),
}

/// Discretized relevance/urgency combination for alert routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityBucket {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Bucket from the relevance/urgency pair. An irrelevant trend stays low
    /// however urgent the trend itself is.
    pub fn from_scores(relevance: f64, urgency: f64) -> Self {
        if relevance < 0.1 {
            return Self::Low;
        }
        let combined = relevance * 0.5 + urgency * 0.5;
        if combined >= 0.75 {
            Self::Critical
        } else if combined >= 0.5 {
            Self::High
        } else if combined >= 0.25 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// What kind of profile entry produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    WatchlistEntity,
    WatchlistAlias,
    Topic,
    Geography,
}

/// One matched profile entry, with both sides of the match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDetail {
    pub kind: MatchKind,

    /// The org-side term (watchlist name, alias, topic or geography)
    pub term: String,

    /// The trend-side value it matched against
    pub matched: String,

    pub weight: f64,
}

/// Auditable record of why a score came out the way it did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub matches: Vec<MatchDetail>,
    pub summary: String,
    pub allowlisted: bool,
    pub blocked: bool,
}

/// Per-(organization, trend event) relevance projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgTrendScore {
    pub organization_id: String,
    pub event_key: String,

    pub relevance_score: f64,
    pub urgency_score: f64,
    pub priority_bucket: PriorityBucket,

    pub matched_entities: Vec<String>,
    pub matched_topics: Vec<String>,
    pub matched_geographies: Vec<String>,

    pub explanation: Explanation,

    pub is_allowlisted: bool,
    pub is_blocked: bool,

    /// Trend state captured at compute time, for material-change detection
    pub stage_at_compute: TrendStage,
    pub confidence_at_compute: f64,

    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OrgTrendScore {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Computes org relevance scores from profiles and trend events
#[derive(Debug, Clone)]
pub struct Projector {
    config: ProjectorConfig,
}

impl Projector {
    pub fn new(config: ProjectorConfig) -> Self {
        Self { config }
    }

    /// Project one trend event onto one org profile.
    ///
    /// Returns `None` when the profile and the event share no entity, topic
    /// or geography (and the event is not allowlisted); no score row is
    /// materialized for non-intersecting pairs.
    pub fn project(
        &self,
        org: &OrgProfile,
        event: &TrendEvent,
        now: DateTime<Utc>,
    ) -> Option<OrgTrendScore> {
        let blocked = org.blocklist.iter().any(|k| k == &event.event_key);
        let allowlisted = org.allowlist.iter().any(|k| k == &event.event_key);

        if blocked {
            // deny override wins over everything, including the allowlist
            return Some(self.blocked_score(org, event, now));
        }

        let matches = collect_matches(org, event);
        if matches.is_empty() && !allowlisted {
            return None;
        }

        let relevance = self.relevance_score(&matches);
        let urgency = self.urgency_score(event);

        let mut bucket = PriorityBucket::from_scores(relevance, urgency);
        if allowlisted && bucket < PriorityBucket::High {
            bucket = PriorityBucket::High;
        }

        let (entities, topics, geographies) = partition_matches(&matches);
        let summary = summarize(org, event, &matches, allowlisted);

        Some(OrgTrendScore {
            organization_id: org.org_id.clone(),
            event_key: event.event_key.clone(),
            relevance_score: relevance,
            urgency_score: urgency,
            priority_bucket: bucket,
            matched_entities: entities,
            matched_topics: topics,
            matched_geographies: geographies,
            explanation: Explanation {
                matches,
                summary,
                allowlisted,
                blocked: false,
            },
            is_allowlisted: allowlisted,
            is_blocked: false,
            stage_at_compute: event.trend_stage,
            confidence_at_compute: event.confidence_score,
            computed_at: now,
            expires_at: now + Duration::hours(self.config.score_ttl_hours as i64),
        })
    }

    /// Whether an existing score must be recomputed: TTL expiry, a stage
    /// transition, or a confidence move beyond the configured delta.
    pub fn needs_recompute(
        &self,
        existing: &OrgTrendScore,
        event: &TrendEvent,
        now: DateTime<Utc>,
    ) -> bool {
        existing.is_expired(now)
            || existing.stage_at_compute != event.trend_stage
            || (existing.confidence_at_compute - event.confidence_score).abs()
                > self.config.confidence_delta_threshold
    }

    fn blocked_score(
        &self,
        org: &OrgProfile,
        event: &TrendEvent,
        now: DateTime<Utc>,
    ) -> OrgTrendScore {
        OrgTrendScore {
            organization_id: org.org_id.clone(),
            event_key: event.event_key.clone(),
            relevance_score: 0.0,
            urgency_score: 0.0,
            priority_bucket: PriorityBucket::Low,
            matched_entities: Vec::new(),
            matched_topics: Vec::new(),
            matched_geographies: Vec::new(),
            explanation: Explanation {
                matches: Vec::new(),
                summary: format!(
                    "'{}' is on the blocklist for {}",
                    event.event_key, org.name
                ),
                allowlisted: false,
                blocked: true,
            },
            is_allowlisted: false,
            is_blocked: true,
            stage_at_compute: event.trend_stage,
            confidence_at_compute: event.confidence_score,
            computed_at: now,
            expires_at: now + Duration::hours(self.config.score_ttl_hours as i64),
        }
    }

    /// Topical/entity match strength, weighted per match kind, bounded [0, 1]
    fn relevance_score(&self, matches: &[MatchDetail]) -> f64 {
        let best_of = |kinds: &[MatchKind]| -> f64 {
            matches
                .iter()
                .filter(|m| kinds.contains(&m.kind))
                .map(|m| m.weight.clamp(0.0, 1.0))
                .fold(0.0, f64::max)
        };

        let entity = best_of(&[MatchKind::WatchlistEntity, MatchKind::WatchlistAlias]);
        let topic = best_of(&[MatchKind::Topic]);
        let geography = best_of(&[MatchKind::Geography]);

        (self.config.entity_match_weight * entity
            + self.config.topic_match_weight * topic
            + self.config.geography_match_weight * geography)
            .clamp(0.0, 1.0)
    }

    /// Urgency derived from the trend's own state: lifecycle stage, velocity
    /// and confidence, with breaking status as a floor.
    fn urgency_score(&self, event: &TrendEvent) -> f64 {
        let stage_factor = match event.trend_stage {
            TrendStage::Trending => 1.0,
            TrendStage::Rising => 0.8,
            TrendStage::Peaked => 0.6,
            TrendStage::New => 0.4,
            TrendStage::Declining => 0.3,
            TrendStage::Stale => 0.1,
            TrendStage::Archived => 0.0,
        };

        // velocity_score is capped at component_cap per term; 10 is the
        // default working range
        let velocity_factor = (event.metrics.velocity_score / 10.0).clamp(0.0, 1.0);

        let mut urgency =
            0.4 * stage_factor + 0.3 * velocity_factor + 0.3 * event.confidence_score;
        if event.is_breaking {
            urgency = urgency.max(0.9);
        }
        urgency.clamp(0.0, 1.0)
    }
}

/// Case-insensitive token-subset test: does `needle` appear, as a whole
/// token sequence member, inside `haystack`?
fn token_match(needle: &str, haystack: &str) -> bool {
    let needle_tokens: BTreeSet<String> = tokens(needle);
    if needle_tokens.is_empty() {
        return false;
    }
    let haystack_tokens: BTreeSet<String> = tokens(haystack);
    needle_tokens.is_subset(&haystack_tokens)
}

fn tokens(s: &str) -> BTreeSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Every label surface a trend event exposes for matching
fn event_surfaces(event: &TrendEvent) -> Vec<&str> {
    let mut surfaces = vec![event.canonical_label.as_str()];
    surfaces.extend(event.alias_variants.iter().map(String::as_str));
    surfaces.extend(event.topics.iter().map(String::as_str));
    surfaces
}

fn collect_matches(org: &OrgProfile, event: &TrendEvent) -> Vec<MatchDetail> {
    let mut matches = Vec::new();
    let surfaces = event_surfaces(event);

    for entity in &org.watchlist {
        if let Some(surface) = surfaces.iter().find(|s| token_match(&entity.name, s)) {
            matches.push(MatchDetail {
                kind: MatchKind::WatchlistEntity,
                term: entity.name.clone(),
                matched: (*surface).to_string(),
                weight: entity.weight,
            });
            continue;
        }
        // the canonical name missed; try each alias and name which one hit
        for alias in &entity.aliases {
            if let Some(surface) = surfaces.iter().find(|s| token_match(alias, s)) {
                matches.push(MatchDetail {
                    kind: MatchKind::WatchlistAlias,
                    term: alias.clone(),
                    matched: (*surface).to_string(),
                    weight: entity.weight,
                });
                break;
            }
        }
    }

    for affinity in &org.topics {
        if let Some(surface) = surfaces.iter().find(|s| token_match(&affinity.topic, s)) {
            matches.push(MatchDetail {
                kind: MatchKind::Topic,
                term: affinity.topic.clone(),
                matched: (*surface).to_string(),
                weight: affinity.weight,
            });
        }
    }

    for geo in &org.geographies {
        if let Some(hit) = event
            .geographies
            .iter()
            .find(|g| g.to_lowercase() == geo.to_lowercase())
        {
            matches.push(MatchDetail {
                kind: MatchKind::Geography,
                term: geo.clone(),
                matched: hit.clone(),
                weight: 1.0,
            });
        }
    }

    matches
}

fn partition_matches(matches: &[MatchDetail]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut entities = Vec::new();
    let mut topics = Vec::new();
    let mut geographies = Vec::new();
    for m in matches {
        match m.kind {
            MatchKind::WatchlistEntity | MatchKind::WatchlistAlias => {
                entities.push(m.term.clone())
            }
            MatchKind::Topic => topics.push(m.term.clone()),
            MatchKind::Geography => geographies.push(m.term.clone()),
        }
    }
    (entities, topics, geographies)
}

fn summarize(
    org: &OrgProfile,
    event: &TrendEvent,
    matches: &[MatchDetail],
    allowlisted: bool,
) -> String {
    if matches.is_empty() {
        return format!(
            "'{}' surfaced for {} via allowlist",
            event.canonical_label, org.name
        );
    }
    let parts: Vec<String> = matches
        .iter()
        .map(|m| match m.kind {
            MatchKind::WatchlistEntity => format!("watchlist entity '{}'", m.term),
            MatchKind::WatchlistAlias => {
                format!("alias '{}' (via '{}')", m.term, m.matched)
            }
            MatchKind::Topic => format!("topic '{}'", m.term),
            MatchKind::Geography => format!("geography '{}'", m.term),
        })
        .collect();
    let mut summary = format!(
        "'{}' matched {} on {}",
        event.canonical_label,
        org.name,
        parts.join(", ")
    );
    if allowlisted {
        summary.push_str("; allowlisted");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityType, TrendMetrics};

    fn org() -> OrgProfile {
        OrgProfile {
            org_id: "org-1".to_string(),
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

    fn event(label: &str) -> TrendEvent {
        let now = Utc::now();
        let mut e = TrendEvent::new(crate::models::event_key_for_label(label), label, EntityType::Event, now);
        e.trend_stage = TrendStage::Trending;
        e.confidence_score = 0.8;
        e.metrics = TrendMetrics {
            velocity: 5.0,
            velocity_score: 6.0,
            ..Default::default()
        };
        e
    }

    fn projector() -> Projector {
        Projector::new(ProjectorConfig::default())
    }

    #[test]
    fn test_watchlist_match_produces_score() {
        let now = Utc::now();
        let score = projector()
            .project(&org(), &event("Jane Doe Healthcare Bill"), now)
            .unwrap();

        assert!(score.relevance_score > 0.5);
        assert!(score.urgency_score > 0.5);
        assert!(score.matched_entities.contains(&"Jane Doe".to_string()));
        assert!(score.matched_topics.contains(&"healthcare".to_string()));
        assert!(score.explanation.summary.contains("Jane Doe"));
        assert!(score.priority_bucket >= PriorityBucket::High);
    }

    #[test]
    fn test_no_intersection_no_score() {
        let now = Utc::now();
        assert!(projector()
            .project(&org(), &event("Downtown Transit Strike"), now)
            .is_none());
    }

    #[test]
    fn test_alias_match_is_explained() {
        let now = Utc::now();
        let mut e = event("Springfield Statehouse Session");
        e.alias_variants.insert("Rep. Doe floor speech".to_string());

        let score = projector().project(&org(), &e, now).unwrap();

        // canonical label missed, the alias variant hit via "Rep. Doe"
        assert!(score.relevance_score > 0.0);
        let alias_match = score
            .explanation
            .matches
            .iter()
            .find(|m| m.kind == MatchKind::WatchlistAlias)
            .expect("alias match recorded");
        assert_eq!(alias_match.term, "Rep. Doe");
        assert_eq!(alias_match.matched, "Rep. Doe floor speech");
        assert!(score.explanation.summary.contains("Rep. Doe"));
    }

    #[test]
    fn test_blocklist_wins() {
        let now = Utc::now();
        let mut o = org();
        let e = event("Jane Doe Healthcare Bill");
        o.blocklist.push(e.event_key.clone());
        // even allowlisted at the same time, deny wins
        o.allowlist.push(e.event_key.clone());

        let score = projector().project(&o, &e, now).unwrap();
        assert!(score.is_blocked);
        assert_eq!(score.relevance_score, 0.0);
        assert_eq!(score.priority_bucket, PriorityBucket::Low);
        assert!(score.explanation.blocked);
    }

    #[test]
    fn test_allowlist_floors_priority() {
        let now = Utc::now();
        let mut o = org();
        let mut e = event("Unrelated Quiet Story");
        e.trend_stage = TrendStage::New;
        e.confidence_score = 0.1;
        e.metrics = TrendMetrics::default();
        o.allowlist.push(e.event_key.clone());

        let score = projector().project(&o, &e, now).unwrap();
        assert!(score.is_allowlisted);
        assert!(score.priority_bucket >= PriorityBucket::High);
    }

    #[test]
    fn test_geography_match() {
        let now = Utc::now();
        let mut e = event("Hospital Funding Protest healthcare");
        e.geographies.insert("Springfield".to_string());
        let score = projector().project(&org(), &e, now).unwrap();
        assert_eq!(score.matched_geographies, vec!["springfield".to_string()]);
    }

    #[test]
    fn test_breaking_floors_urgency() {
        let now = Utc::now();
        let mut e = event("Jane Doe Healthcare Bill");
        e.is_breaking = true;
        e.trend_stage = TrendStage::Rising;
        let score = projector().project(&org(), &e, now).unwrap();
        assert!(score.urgency_score >= 0.9);
    }

    #[test]
    fn test_needs_recompute_on_expiry_and_material_change() {
        let now = Utc::now();
        let p = projector();
        let e = event("Jane Doe Healthcare Bill");
        let score = p.project(&org(), &e, now).unwrap();

        assert!(!p.needs_recompute(&score, &e, now));
        // TTL expiry
        assert!(p.needs_recompute(&score, &e, score.expires_at));
        // stage transition
        let mut peaked = e.clone();
        peaked.trend_stage = TrendStage::Peaked;
        assert!(p.needs_recompute(&score, &peaked, now));
        // confidence drift beyond the threshold
        let mut faded = e.clone();
        faded.confidence_score = 0.5;
        assert!(p.needs_recompute(&score, &faded, now));
        // small drift is not material
        let mut wiggle = e;
        wiggle.confidence_score = 0.82;
        assert!(!p.needs_recompute(&score, &wiggle, now));
    }

    #[test]
    fn test_priority_buckets() {
        assert_eq!(PriorityBucket::from_scores(0.0, 1.0), PriorityBucket::Low);
        assert_eq!(PriorityBucket::from_scores(0.9, 0.9), PriorityBucket::Critical);
        assert_eq!(PriorityBucket::from_scores(0.6, 0.5), PriorityBucket::High);
        assert_eq!(PriorityBucket::from_scores(0.3, 0.3), PriorityBucket::Medium);
        assert_eq!(PriorityBucket::from_scores(0.15, 0.1), PriorityBucket::Low);
    }
}
