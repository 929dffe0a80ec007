//! Phrase and semantic clustering
//!
//! Two layers sit between raw labels and canonical trend events:
//!
//! - [`phrase`] merges near-identical textual labels ("Doe healthcare bill",
//!   "Jane Doe Healthcare Bill!") into one canonical phrase via token-overlap
//!   similarity, choosing the highest-authority phrasing as representative.
//! - [`semantic`] groups topically related but textually distinct canonical
//!   events using cosine similarity over precomputed topic-description
//!   vectors, for cross-topic correlation.
//!
//! Both are incremental (attach-or-seed) and store clusters in an arena:
//! stable integer ids, members held by value. Merges are idempotent and
//! commutative: the cluster with the lower creation timestamp always wins,
//! with the lower id as tie-break, so replaying a merge race in any order
//! converges on the same canonical result.

pub mod phrase;
pub mod semantic;

pub use phrase::{PhraseAssignment, PhraseCluster, PhraseClusterer};
pub use semantic::{SemanticCluster, SemanticClusterer};

use thiserror::Error;

/// Stable arena identifier for a cluster
pub type ClusterId = u32;

/// Errors raised during clustering
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster {0} does not exist")]
    UnknownCluster(ClusterId),

    /// Two clusters claimed the same member during a merge race. Resolved
    /// deterministically by the creation-timestamp rule; callers log and
    /// continue.
    #[error("clusters {winner} and {loser} contested a member; {winner} wins")]
    Conflict {
        winner: ClusterId,
        loser: ClusterId,
    },

    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl ClusterError {
    pub fn is_recoverable(&self) -> bool {
        // conflicts resolve themselves; the rest indicate caller bugs
        matches!(self, Self::Conflict { .. })
    }
}

/// Normalize a label into its lowercase alphanumeric token set
pub(crate) fn tokens(label: &str) -> std::collections::BTreeSet<String> {
    label
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
