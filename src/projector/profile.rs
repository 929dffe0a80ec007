//! Organization interest profiles
//!
//! A profile describes what one subscribing organization cares about:
//! watchlist entities (with aliases), weighted topic affinities,
//! geographies, and explicit allow/deny overrides. Profiles are read-only
//! inputs to the projector, loaded from a TOML file:
//!
//! ```toml
//! [[organizations]]
//! org_id = "org-123"
//! name = "Civic Health Coalition"
//! geographies = ["springfield"]
//!
//! [[organizations.watchlist]]
//! name = "Jane Doe"
//! aliases = ["Rep. Doe", "Representative Doe"]
//! weight = 1.0
//!
//! [[organizations.topics]]
//! topic = "healthcare"
//! weight = 0.8
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::ProjectionError;

fn default_weight() -> f64 {
    1.0
}

/// One watched entity with its alias variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEntity {
    pub name: String,

    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// A weighted topic affinity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicAffinity {
    pub topic: String,

    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// One organization's interest profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgProfile {
    pub org_id: String,
    pub name: String,

    #[serde(default)]
    pub watchlist: Vec<WatchEntity>,

    #[serde(default)]
    pub topics: Vec<TopicAffinity>,

    #[serde(default)]
    pub geographies: Vec<String>,

    /// Event keys always surfaced regardless of computed score
    #[serde(default)]
    pub allowlist: Vec<String>,

    /// Event keys never surfaced regardless of computed score
    #[serde(default)]
    pub blocklist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    organizations: Vec<OrgProfile>,
}

/// Load all organization profiles from a TOML file
pub fn load_profiles(path: &Path) -> Result<Vec<OrgProfile>, ProjectionError> {
    let content = std::fs::read_to_string(path).map_err(|source| ProjectionError::ProfileRead {
        path: path.display().to_string(),
        source,
    })?;

    let file: ProfileFile =
        toml::from_str(&content).map_err(|e| ProjectionError::ProfileParse(Box::new(e)))?;

    Ok(file.organizations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profiles() {
        let toml_str = r#"
            [[organizations]]
            org_id = "org-1"
            name = "Civic Health Coalition"
            geographies = ["springfield"]
            allowlist = ["city-budget-vote"]

            [[organizations.watchlist]]
            name = "Jane Doe"
            aliases = ["Rep. Doe"]

            [[organizations.topics]]
            topic = "healthcare"
            weight = 0.8
        "#;
        let file: ProfileFile = toml::from_str(toml_str).unwrap();
        assert_eq!(file.organizations.len(), 1);

        let org = &file.organizations[0];
        assert_eq!(org.org_id, "org-1");
        assert_eq!(org.watchlist[0].aliases, vec!["Rep. Doe"]);
        // weight defaults to 1.0 when unspecified
        assert!((org.watchlist[0].weight - 1.0).abs() < f64::EPSILON);
        assert!((org.topics[0].weight - 0.8).abs() < f64::EPSILON);
        assert_eq!(org.allowlist, vec!["city-budget-vote"]);
        assert!(org.blocklist.is_empty());
    }

    #[test]
    fn test_missing_file_errors() {
        let err = load_profiles(Path::new("/nonexistent/orgs.toml")).unwrap_err();
        assert!(matches!(err, ProjectionError::ProfileRead { .. }));
    }
}
