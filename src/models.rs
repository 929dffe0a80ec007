// Core data structures for the pado trend engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Media source type for a mention record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    News,
    Social,
    Press,
    Legislative,
}

impl SourceType {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Social => "social",
            Self::Press => "press",
            Self::Legislative => "legislative",
        }
    }

    /// Create from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "news" => Some(Self::News),
            "social" => Some(Self::Social),
            "press" | "press_release" => Some(Self::Press),
            "legislative" | "gov" => Some(Self::Legislative),
            _ => None,
        }
    }

    /// Get all source types
    pub fn all() -> Vec<Self> {
        vec![Self::News, Self::Social, Self::Press, Self::Legislative]
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authority tier of a source. Tier 1 carries the most editorial weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Tier1,
    Tier2,
    Tier3,
}

impl SourceTier {
    /// Authority weight used when ranking cluster representatives
    pub fn authority_weight(&self) -> f64 {
        match self {
            Self::Tier1 => 1.0,
            Self::Tier2 => 0.6,
            Self::Tier3 => 0.3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
            Self::Tier3 => "tier3",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tier1" | "1" => Some(Self::Tier1),
            "tier2" | "2" => Some(Self::Tier2),
            "tier3" | "3" => Some(Self::Tier3),
            _ => None,
        }
    }
}

impl Default for SourceTier {
    /// Unknown sources default to the lowest-authority tier
    fn default() -> Self {
        Self::Tier3
    }
}

/// Entity type classification for a trend label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Topic,
    Event,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Topic => "topic",
            Self::Event => "event",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "person" | "per" => Self::Person,
            "organization" | "org" => Self::Organization,
            "location" | "loc" | "gpe" => Self::Location,
            "topic" => Self::Topic,
            "event" => Self::Event,
            _ => Self::Other,
        }
    }
}

/// Raw mention record as delivered by upstream collectors.
///
/// This is the insert shape: fields are unvalidated and partially optional.
/// The normalizer turns it into a [`MentionEvidence`] or rejects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvidence {
    pub source_type: SourceType,
    pub source_url: String,
    pub content: String,

    /// Pre-extracted topic/entity labels, most specific first
    pub labels: Vec<String>,

    #[serde(default)]
    pub entity_type: Option<EntityType>,

    pub published_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sentiment_score: Option<f64>,

    #[serde(default)]
    pub source_tier: Option<SourceTier>,

    #[serde(default)]
    pub geographies: Vec<String>,

    /// Precomputed topic-description embedding, if the collector supplies one
    #[serde(default)]
    pub topic_vector: Option<Vec<f32>>,
}

/// One validated, immutable observation of a topic/entity in a source item.
///
/// Recorded once by the normalizer and never mutated afterwards; scoring
/// stages only read it. At most one evidence row per trend event carries
/// `is_primary = true` (the representative item).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionEvidence {
    pub id: Uuid,
    pub source_type: SourceType,
    pub source_tier: SourceTier,

    /// Canonical URL with tracking parameters stripped
    pub canonical_url: String,

    /// Registrable host of the canonical URL, for corroboration counting
    pub domain: String,

    /// SHA256 of the content, dedupe key together with `source_type`
    pub content_hash: String,

    pub labels: Vec<String>,
    pub entity_type: EntityType,
    pub geographies: Vec<String>,

    pub published_at: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,

    pub sentiment_score: Option<f64>,

    /// Contribution weight (source-type weight x tier authority)
    pub weight: f64,

    pub is_primary: bool,

    pub topic_vector: Option<Vec<f32>>,
}

impl MentionEvidence {
    /// Primary label (first, most specific)
    pub fn primary_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }
}

/// Compute the SHA256 hex digest of a content string
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Derive a stable event key from a label: lowercase alphanumeric tokens
/// joined by `-`. Two phrasings that normalize to the same token sequence
/// share a key.
pub fn event_key_for_label(label: &str) -> String {
    label
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Lifecycle stage of a trend event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStage {
    New,
    Rising,
    Trending,
    Peaked,
    Declining,
    Stale,
    Archived,
}

impl TrendStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Rising => "rising",
            Self::Trending => "trending",
            Self::Peaked => "peaked",
            Self::Declining => "declining",
            Self::Stale => "stale",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "rising" => Some(Self::Rising),
            "trending" => Some(Self::Trending),
            "peaked" => Some(Self::Peaked),
            "declining" => Some(Self::Declining),
            "stale" => Some(Self::Stale),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// Archived events are kept for history but excluded from active scoring
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Archived)
    }

    /// Whether the state machine permits a direct transition.
    ///
    /// Forward transitions follow the lifecycle order; `Declining` and
    /// `Stale` may re-enter `Rising` when fresh evidence arrives before
    /// archival. `Archived` is terminal.
    pub fn can_transition_to(&self, next: TrendStage) -> bool {
        use TrendStage::*;
        matches!(
            (self, next),
            (New, Rising)
                | (Rising, Trending)
                | (Trending, Peaked)
                | (Peaked, Declining)
                | (Declining, Stale)
                | (Stale, Archived)
                | (Declining, Rising)
                | (Stale, Rising)
        )
    }
}

impl std::fmt::Display for TrendStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Label quality classification produced by the scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelQuality {
    /// Specific named event phrase ("Jane Doe Healthcare Bill")
    EventPhrase,
    /// Generic single-word or bare entity ("Congress")
    EntityOnly,
    /// Could not classify the label at all
    Fallback,
}

impl LabelQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventPhrase => "event_phrase",
            Self::EntityOnly => "entity_only",
            Self::Fallback => "fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "event_phrase" => Some(Self::EventPhrase),
            "entity_only" => Some(Self::EntityOnly),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// Mention counts over the standard short windows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounts {
    pub count_1h: u64,
    pub count_6h: u64,
    pub count_24h: u64,
}

/// Evidence counts by source authority tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub tier1: u64,
    pub tier2: u64,
    pub tier3: u64,
}

impl TierCounts {
    pub fn total(&self) -> u64 {
        self.tier1 + self.tier2 + self.tier3
    }

    /// True when every piece of evidence is lowest-tier
    pub fn is_tier3_only(&self) -> bool {
        self.tier1 == 0 && self.tier2 == 0 && self.tier3 > 0
    }

    pub fn record(&mut self, tier: SourceTier) {
        match tier {
            SourceTier::Tier1 => self.tier1 += 1,
            SourceTier::Tier2 => self.tier2 += 1,
            SourceTier::Tier3 => self.tier3 += 1,
        }
    }
}

/// Snapshot of the baseline at the time a trend event was last scored
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub avg_hourly_mentions: f64,
    pub avg_daily_mentions: f64,
    pub std_dev_hourly: f64,
    pub peak_mentions_24h: u64,
    pub data_points: u64,
}

impl BaselineSnapshot {
    /// A baseline with no samples or zero variance cannot support anomaly
    /// classification yet
    pub fn is_established(&self, min_data_points: u64) -> bool {
        self.data_points >= min_data_points && self.std_dev_hourly > 0.0
    }
}

/// Burst/velocity metrics computed for a trend event
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendMetrics {
    /// Ratio of current to baseline mention rate
    pub velocity: f64,
    /// Velocity delta against the previous window
    pub acceleration: f64,
    pub z_score: f64,
    /// Negative log-probability of the observed count under the baseline
    pub poisson_surprise: f64,
    pub cross_source_score: f64,
    /// Bounded composite of velocity, z-score and surprise
    pub velocity_score: f64,
}

/// The canonical, deduplicated unit of a detected trend.
///
/// Created on first unmatched evidence, updated on every matching ingestion,
/// archived (never deleted) once stale beyond the configured window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendEvent {
    pub event_key: String,
    pub canonical_label: String,

    /// Raw phrasings merged into this event by the phrase clusterer
    pub alias_variants: BTreeSet<String>,

    pub entity_type: EntityType,

    pub counts: WindowCounts,
    pub tier_counts: TierCounts,

    /// Distinct source types seen so far
    pub source_types: BTreeSet<SourceType>,

    /// Distinct registrable domains, for corroboration
    pub domains: BTreeSet<String>,

    pub geographies: BTreeSet<String>,
    pub topics: BTreeSet<String>,

    pub baseline: BaselineSnapshot,
    pub metrics: TrendMetrics,

    pub evidence_count: u64,
    pub avg_sentiment: Option<f64>,

    /// How many evidence items carried a sentiment score (running-mean denominator)
    pub sentiment_samples: u64,

    pub confidence_score: f64,
    pub label_quality: LabelQuality,

    pub trend_stage: TrendStage,
    pub is_breaking: bool,
    pub is_trending: bool,

    /// Highest 1h count observed over the event's lifetime
    pub peak_count_1h: u64,

    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,

    /// Semantic cluster membership, if grouped
    pub semantic_cluster: Option<u32>,

    pub topic_vector: Option<Vec<f32>>,
}

impl TrendEvent {
    /// Create a fresh event for a first-seen key
    pub fn new(
        event_key: impl Into<String>,
        canonical_label: impl Into<String>,
        entity_type: EntityType,
        first_seen_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_key: event_key.into(),
            canonical_label: canonical_label.into(),
            alias_variants: BTreeSet::new(),
            entity_type,
            counts: WindowCounts::default(),
            tier_counts: TierCounts::default(),
            source_types: BTreeSet::new(),
            domains: BTreeSet::new(),
            geographies: BTreeSet::new(),
            topics: BTreeSet::new(),
            baseline: BaselineSnapshot::default(),
            metrics: TrendMetrics::default(),
            evidence_count: 0,
            avg_sentiment: None,
            sentiment_samples: 0,
            confidence_score: 0.0,
            label_quality: LabelQuality::Fallback,
            trend_stage: TrendStage::New,
            is_breaking: false,
            is_trending: false,
            peak_count_1h: 0,
            first_seen_at,
            last_seen_at: first_seen_at,
            semantic_cluster: None,
            topic_vector: None,
        }
    }

    /// Number of distinct source types reporting this event
    pub fn source_count(&self) -> u32 {
        self.source_types.len() as u32
    }

    /// Build the external projection consumed by downstream systems
    pub fn projection(&self) -> TrendEventProjection {
        TrendEventProjection {
            event_key: self.event_key.clone(),
            canonical_label: self.canonical_label.clone(),
            entity_type: self.entity_type,
            current_1h: self.counts.count_1h,
            current_6h: self.counts.count_6h,
            current_24h: self.counts.count_24h,
            velocity: self.metrics.velocity,
            acceleration: self.metrics.acceleration,
            confidence_score: self.confidence_score,
            label_quality: self.label_quality,
            trend_stage: self.trend_stage,
            is_breaking: self.is_breaking,
            is_trending: self.is_trending,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
        }
    }
}

/// Output contract for downstream trend consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendEventProjection {
    pub event_key: String,
    pub canonical_label: String,
    pub entity_type: EntityType,
    pub current_1h: u64,
    pub current_6h: u64,
    pub current_24h: u64,
    pub velocity: f64,
    pub acceleration: f64,
    pub confidence_score: f64,
    pub label_quality: LabelQuality,
    pub trend_stage: TrendStage,
    pub is_breaking: bool,
    pub is_trending: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_roundtrip() {
        for st in SourceType::all() {
            assert_eq!(SourceType::parse(st.as_str()), Some(st));
        }
    }

    #[test]
    fn test_source_tier_default_is_lowest() {
        assert_eq!(SourceTier::default(), SourceTier::Tier3);
        assert!(SourceTier::Tier1.authority_weight() > SourceTier::Tier3.authority_weight());
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash("same content");
        let b = content_hash("same content");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("other content"));
    }

    #[test]
    fn test_event_key_normalization() {
        assert_eq!(
            event_key_for_label("Jane Doe Healthcare Bill"),
            "jane-doe-healthcare-bill"
        );
        assert_eq!(
            event_key_for_label("  Jane   DOE: healthcare bill!  "),
            "jane-doe-healthcare-bill"
        );
    }

    #[test]
    fn test_stage_transitions() {
        use TrendStage::*;
        assert!(New.can_transition_to(Rising));
        assert!(Rising.can_transition_to(Trending));
        assert!(Trending.can_transition_to(Peaked));
        assert!(Peaked.can_transition_to(Declining));
        assert!(Declining.can_transition_to(Stale));
        assert!(Stale.can_transition_to(Archived));
        // re-ignition is allowed until archival
        assert!(Declining.can_transition_to(Rising));
        assert!(Stale.can_transition_to(Rising));
        // archived is terminal
        assert!(!Archived.can_transition_to(Rising));
        assert!(!New.can_transition_to(Trending));
    }

    #[test]
    fn test_tier_counts() {
        let mut tc = TierCounts::default();
        tc.record(SourceTier::Tier3);
        tc.record(SourceTier::Tier3);
        assert!(tc.is_tier3_only());
        tc.record(SourceTier::Tier1);
        assert!(!tc.is_tier3_only());
        assert_eq!(tc.total(), 3);
    }

    #[test]
    fn test_trend_event_projection() {
        let now = Utc::now();
        let event = TrendEvent::new("k", "Label", EntityType::Topic, now);
        let proj = event.projection();
        assert_eq!(proj.event_key, "k");
        assert_eq!(proj.trend_stage, TrendStage::New);
        assert_eq!(proj.current_1h, 0);
    }
}
