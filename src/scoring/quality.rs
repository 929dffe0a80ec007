//! Label quality classification and evergreen suppression
//!
//! A canonical label that names a specific event ("Jane Doe Healthcare
//! Bill") deserves more trust than a bare entity ("Congress"). Perennial
//! hot-button entities additionally sit on the evergreen list: at normal
//! volume they are suppressed from breaking classification no matter how
//! fast they move, because they are always moving.

use crate::config::DetectionConfig;
use crate::models::{EntityType, LabelQuality};

/// Classify a canonical label.
///
/// Three or more tokens read as a specific event phrase; two tokens only
/// when the upstream extractor typed the label as an event; one token is a
/// bare entity; anything unparseable falls back.
pub fn classify_label(label: &str, entity_type: EntityType) -> LabelQuality {
    let token_count = label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .count();

    match token_count {
        0 => LabelQuality::Fallback,
        1 => LabelQuality::EntityOnly,
        2 if entity_type == EntityType::Event => LabelQuality::EventPhrase,
        2 => LabelQuality::EntityOnly,
        _ => LabelQuality::EventPhrase,
    }
}

/// Whether a label matches the configured evergreen topic list.
///
/// Matching is case-insensitive on the whole normalized label; "Congress"
/// matches, "Congress Shutdown Vote" does not.
pub fn is_evergreen(label: &str, evergreen_topics: &[String]) -> bool {
    let normalized = label.trim().to_lowercase();
    evergreen_topics
        .iter()
        .any(|topic| topic.to_lowercase() == normalized)
}

/// Evergreen suppression decision.
///
/// Suppression requires all of: suppression enabled, a non-event-phrase
/// label on the evergreen list, and 24h volume below the override threshold.
/// Above the override volume even evergreen topics may surface.
pub fn evergreen_suppressed(
    label: &str,
    quality: LabelQuality,
    count_24h: u64,
    config: &DetectionConfig,
) -> bool {
    config.suppress_evergreen
        && quality != LabelQuality::EventPhrase
        && is_evergreen(label, &config.evergreen_topics)
        && count_24h < config.evergreen_volume_override
}
