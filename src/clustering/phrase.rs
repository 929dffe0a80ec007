//! Surface-phrase clustering
//!
//! Merges near-duplicate textual labels into one canonical phrase. A new
//! phrase either joins the cluster whose representative it most resembles
//! (token-set Jaccard above the admit threshold) or seeds a new cluster.
//! The representative is the member with the highest authority weight,
//! earliest-seen on ties, so a tier-1 phrasing wins over a social variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

use super::{tokens, ClusterError, ClusterId};

/// One cluster of near-duplicate phrasings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseCluster {
    pub id: ClusterId,

    /// Canonical phrasing for the whole cluster
    pub representative: String,

    rep_authority: f64,
    rep_seen_at: DateTime<Utc>,

    pub members: BTreeSet<String>,

    pub created_at: DateTime<Utc>,
}

impl PhraseCluster {
    fn new(
        id: ClusterId,
        phrase: &str,
        authority: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let mut members = BTreeSet::new();
        members.insert(phrase.to_string());
        Self {
            id,
            representative: phrase.to_string(),
            rep_authority: authority,
            rep_seen_at: now,
            members,
            created_at: now,
        }
    }

    /// Promote a member to representative if it carries more authority
    fn consider_representative(&mut self, phrase: &str, authority: f64, seen_at: DateTime<Utc>) {
        let wins = authority > self.rep_authority
            || (authority == self.rep_authority && seen_at < self.rep_seen_at);
        if wins {
            self.representative = phrase.to_string();
            self.rep_authority = authority;
            self.rep_seen_at = seen_at;
        }
    }
}

/// Outcome of assigning one phrase
#[derive(Debug, Clone)]
pub struct PhraseAssignment {
    pub cluster_id: ClusterId,

    /// Canonical phrase after this assignment
    pub representative: String,

    /// True when the phrase seeded a brand-new cluster
    pub seeded: bool,
}

/// Incremental phrase clusterer with arena storage.
///
/// Clusters are addressed by stable integer id; merged clusters leave a
/// tombstone slot so ids never get reused within one arena's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseClusterer {
    clusters: Vec<Option<PhraseCluster>>,
    by_phrase: HashMap<String, ClusterId>,
    threshold: f64,
}

impl PhraseClusterer {
    pub fn new(threshold: f64) -> Self {
        Self {
            clusters: Vec::new(),
            by_phrase: HashMap::new(),
            threshold,
        }
    }

    /// Token-set Jaccard similarity between two labels
    pub fn similarity(a: &str, b: &str) -> f64 {
        let ta = tokens(a);
        let tb = tokens(b);
        let union = ta.union(&tb).count();
        if union == 0 {
            return 0.0;
        }
        let intersection = ta.intersection(&tb).count();
        intersection as f64 / union as f64
    }

    /// Attach a phrase to the best matching cluster or seed a new one.
    ///
    /// Idempotent: re-assigning a known phrase returns its current cluster
    /// (still re-considering representative promotion, since authority may
    /// differ between sightings).
    pub fn assign(&mut self, phrase: &str, authority: f64, now: DateTime<Utc>) -> PhraseAssignment {
        if let Some(&id) = self.by_phrase.get(phrase) {
            let cluster = self.clusters[id as usize]
                .as_mut()
                .expect("phrase index points at live cluster");
            cluster.consider_representative(phrase, authority, now);
            return PhraseAssignment {
                cluster_id: id,
                representative: cluster.representative.clone(),
                seeded: false,
            };
        }

        let best = self
            .clusters
            .iter()
            .flatten()
            .map(|c| (c.id, Self::similarity(phrase, &c.representative)))
            .filter(|(_, sim)| *sim >= self.threshold)
            .max_by(|(ia, sa), (ib, sb)| {
                sa.partial_cmp(sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // deterministic winner on equal similarity
                    .then(ib.cmp(ia))
            });

        match best {
            Some((id, _)) => {
                let cluster = self.clusters[id as usize]
                    .as_mut()
                    .expect("similarity scan only sees live clusters");
                cluster.members.insert(phrase.to_string());
                cluster.consider_representative(phrase, authority, now);
                self.by_phrase.insert(phrase.to_string(), id);
                PhraseAssignment {
                    cluster_id: id,
                    representative: cluster.representative.clone(),
                    seeded: false,
                }
            }
            None => {
                let id = self.clusters.len() as ClusterId;
                let cluster = PhraseCluster::new(id, phrase, authority, now);
                self.by_phrase.insert(phrase.to_string(), id);
                let representative = cluster.representative.clone();
                self.clusters.push(Some(cluster));
                PhraseAssignment {
                    cluster_id: id,
                    representative,
                    seeded: true,
                }
            }
        }
    }

    /// Merge two clusters into one canonical cluster.
    ///
    /// The survivor is always the cluster created first (lower id on equal
    /// timestamps), so merge order cannot change the outcome. Member
    /// references re-point in the same step. Merging a cluster with itself
    /// is a no-op.
    pub fn merge(&mut self, a: ClusterId, b: ClusterId) -> Result<ClusterId, ClusterError> {
        if a == b {
            return Ok(a);
        }
        let ca = self
            .clusters
            .get(a as usize)
            .and_then(Option::as_ref)
            .ok_or(ClusterError::UnknownCluster(a))?;
        let cb = self
            .clusters
            .get(b as usize)
            .and_then(Option::as_ref)
            .ok_or(ClusterError::UnknownCluster(b))?;

        let (winner, loser) = match ca.created_at.cmp(&cb.created_at) {
            std::cmp::Ordering::Less => (a, b),
            std::cmp::Ordering::Greater => (b, a),
            std::cmp::Ordering::Equal => (a.min(b), a.max(b)),
        };

        let absorbed = self.clusters[loser as usize]
            .take()
            .expect("checked live above");
        let surviving = self.clusters[winner as usize]
            .as_mut()
            .expect("checked live above");

        if !surviving.members.is_disjoint(&absorbed.members) {
            // both sides claimed a member during a merge race; the
            // creation-timestamp rule resolves it, nothing surfaces
            let conflict = ClusterError::Conflict { winner, loser };
            warn!(%conflict, "Resolved overlapping cluster membership");
        }

        for member in &absorbed.members {
            self.by_phrase.insert(member.clone(), winner);
        }
        surviving.members.extend(absorbed.members);
        surviving.consider_representative(
            &absorbed.representative,
            absorbed.rep_authority,
            absorbed.rep_seen_at,
        );

        Ok(winner)
    }

    /// Cluster currently holding a phrase
    pub fn cluster_of(&self, phrase: &str) -> Option<&PhraseCluster> {
        self.by_phrase
            .get(phrase)
            .and_then(|&id| self.clusters.get(id as usize))
            .and_then(Option::as_ref)
    }

    pub fn get(&self, id: ClusterId) -> Option<&PhraseCluster> {
        self.clusters.get(id as usize).and_then(Option::as_ref)
    }

    /// Live clusters (merged slots excluded)
    pub fn iter(&self) -> impl Iterator<Item = &PhraseCluster> {
        self.clusters.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.clusters.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_similarity() {
        assert!((PhraseClusterer::similarity("jane doe bill", "Jane Doe Bill") - 1.0).abs() < 1e-9);
        let sim = PhraseClusterer::similarity("jane doe healthcare bill", "jane doe bill");
        assert!(sim > 0.5 && sim < 1.0);
        assert_eq!(PhraseClusterer::similarity("apples", "oranges"), 0.0);
    }

    #[test]
    fn test_assign_seeds_then_joins() {
        let now = Utc::now();
        let mut clusterer = PhraseClusterer::new(0.6);

        let first = clusterer.assign("Jane Doe Healthcare Bill", 1.0, now);
        assert!(first.seeded);

        let second = clusterer.assign("jane doe healthcare bill vote", 0.3, now);
        assert!(!second.seeded);
        assert_eq!(second.cluster_id, first.cluster_id);
        // tier-1 phrasing stays representative
        assert_eq!(second.representative, "Jane Doe Healthcare Bill");
    }

    #[test]
    fn test_unrelated_phrase_seeds_new_cluster() {
        let now = Utc::now();
        let mut clusterer = PhraseClusterer::new(0.6);
        clusterer.assign("Jane Doe Healthcare Bill", 1.0, now);
        let other = clusterer.assign("Downtown Transit Strike", 0.5, now);
        assert!(other.seeded);
        assert_eq!(clusterer.len(), 2);
    }

    #[test]
    fn test_higher_authority_takes_representative() {
        let now = Utc::now();
        let mut clusterer = PhraseClusterer::new(0.6);
        clusterer.assign("doe healthcare bill", 0.3, now);
        let promoted = clusterer.assign("Doe Healthcare Bill", 1.0, now + Duration::minutes(5));
        assert_eq!(promoted.representative, "Doe Healthcare Bill");
    }

    #[test]
    fn test_assignment_is_idempotent() {
        let now = Utc::now();
        let mut clusterer = PhraseClusterer::new(0.6);
        let a = clusterer.assign("jane doe bill", 0.5, now);
        let b = clusterer.assign("jane doe bill", 0.5, now + Duration::hours(1));
        assert_eq!(a.cluster_id, b.cluster_id);
        assert_eq!(clusterer.len(), 1);
        assert_eq!(clusterer.cluster_of("jane doe bill").unwrap().members.len(), 1);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let now = Utc::now();
        let later = now + Duration::minutes(1);

        let build = || {
            let mut c = PhraseClusterer::new(0.9);
            c.assign("alpha topic", 0.5, now);
            c.assign("beta topic story", 0.7, later);
            c
        };

        let mut ab = build();
        let winner_ab = ab.merge(0, 1).unwrap();

        let mut ba = build();
        let winner_ba = ba.merge(1, 0).unwrap();

        assert_eq!(winner_ab, winner_ba);
        assert_eq!(
            ab.get(winner_ab).unwrap().representative,
            ba.get(winner_ba).unwrap().representative
        );
        assert_eq!(
            ab.cluster_of("beta topic story").unwrap().id,
            ba.cluster_of("beta topic story").unwrap().id
        );
    }

    #[test]
    fn test_merge_repoints_members() {
        let now = Utc::now();
        let mut clusterer = PhraseClusterer::new(0.95);
        clusterer.assign("first story", 0.5, now);
        clusterer.assign("second story entirely", 0.9, now + Duration::minutes(1));

        let winner = clusterer.merge(0, 1).unwrap();
        assert_eq!(winner, 0);
        assert_eq!(clusterer.len(), 1);
        assert_eq!(clusterer.cluster_of("second story entirely").unwrap().id, 0);
        // absorbed representative had more authority
        assert_eq!(
            clusterer.get(0).unwrap().representative,
            "second story entirely"
        );
    }

    #[test]
    fn test_merge_self_is_noop() {
        let now = Utc::now();
        let mut clusterer = PhraseClusterer::new(0.6);
        clusterer.assign("a topic", 0.5, now);
        assert_eq!(clusterer.merge(0, 0).unwrap(), 0);
        assert_eq!(clusterer.len(), 1);
    }

    #[test]
    fn test_merge_unknown_cluster() {
        let now = Utc::now();
        let mut clusterer = PhraseClusterer::new(0.6);
        clusterer.assign("a topic", 0.5, now);
        assert!(matches!(
            clusterer.merge(0, 99),
            Err(ClusterError::UnknownCluster(99))
        ));
    }
}
