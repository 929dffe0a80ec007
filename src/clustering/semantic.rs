//! Semantic clustering of canonical trend events
//!
//! Groups topically related but textually distinct events ("Doe Healthcare
//! Bill" and "hospital funding protest") using cosine similarity over
//! topic-description vectors computed upstream. Events without a vector do
//! not participate. Cluster aggregates (average velocity/confidence) feed
//! the quality scorer and the org projector's cross-topic context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::{ClusterError, ClusterId};

/// One semantic grouping of trend events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCluster {
    pub id: ClusterId,

    /// Event keys grouped under this cluster
    pub member_keys: BTreeSet<String>,

    /// Mean of member vectors
    centroid: Vec<f32>,

    pub created_at: DateTime<Utc>,

    pub avg_velocity: f64,
    pub avg_confidence: f64,
}

impl SemanticCluster {
    fn new(id: ClusterId, event_key: &str, vector: Vec<f32>, now: DateTime<Utc>) -> Self {
        let mut member_keys = BTreeSet::new();
        member_keys.insert(event_key.to_string());
        Self {
            id,
            member_keys,
            centroid: vector,
            created_at: now,
            avg_velocity: 0.0,
            avg_confidence: 0.0,
        }
    }

    /// Fold one more vector into the running centroid mean
    fn absorb_vector(&mut self, vector: &[f32]) {
        let n = self.member_keys.len() as f32;
        for (c, v) in self.centroid.iter_mut().zip(vector) {
            *c += (*v - *c) / n;
        }
    }
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, ClusterError> {
    if a.len() != b.len() {
        return Err(ClusterError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (norm_a * norm_b)) as f64)
}

/// Incremental semantic clusterer with arena storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticClusterer {
    clusters: Vec<Option<SemanticCluster>>,
    by_key: HashMap<String, ClusterId>,
    threshold: f64,
}

impl SemanticClusterer {
    pub fn new(threshold: f64) -> Self {
        Self {
            clusters: Vec::new(),
            by_key: HashMap::new(),
            threshold,
        }
    }

    /// Attach an event to the closest cluster above the admit threshold, or
    /// seed a new one. Re-assigning a known key returns its cluster.
    pub fn assign(
        &mut self,
        event_key: &str,
        vector: &[f32],
        now: DateTime<Utc>,
    ) -> Result<ClusterId, ClusterError> {
        if let Some(&id) = self.by_key.get(event_key) {
            return Ok(id);
        }

        let mut best: Option<(ClusterId, f64)> = None;
        for cluster in self.clusters.iter().flatten() {
            let sim = cosine_similarity(vector, &cluster.centroid)?;
            if sim < self.threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_id, best_sim)) => {
                    sim > best_sim || (sim == best_sim && cluster.id < best_id)
                }
            };
            if better {
                best = Some((cluster.id, sim));
            }
        }

        match best {
            Some((id, _)) => {
                let cluster = self.clusters[id as usize]
                    .as_mut()
                    .expect("scan only sees live clusters");
                cluster.member_keys.insert(event_key.to_string());
                cluster.absorb_vector(vector);
                self.by_key.insert(event_key.to_string(), id);
                Ok(id)
            }
            None => {
                let id = self.clusters.len() as ClusterId;
                self.clusters
                    .push(Some(SemanticCluster::new(id, event_key, vector.to_vec(), now)));
                self.by_key.insert(event_key.to_string(), id);
                Ok(id)
            }
        }
    }

    /// Merge two clusters; the earlier-created cluster survives (lower id on
    /// ties), members re-point, centroids combine weighted by member count.
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

        let n_winner = surviving.member_keys.len() as f32;
        let n_loser = absorbed.member_keys.len() as f32;
        let total = n_winner + n_loser;
        for (c, other) in surviving.centroid.iter_mut().zip(&absorbed.centroid) {
            *c = (*c * n_winner + *other * n_loser) / total;
        }

        for key in &absorbed.member_keys {
            self.by_key.insert(key.clone(), winner);
        }
        surviving.member_keys.extend(absorbed.member_keys);

        Ok(winner)
    }

    /// Refresh a cluster's aggregate stats from its members' current metrics
    pub fn update_stats(
        &mut self,
        id: ClusterId,
        velocities: &[f64],
        confidences: &[f64],
    ) -> Result<(), ClusterError> {
        let cluster = self
            .clusters
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or(ClusterError::UnknownCluster(id))?;

        cluster.avg_velocity = mean(velocities);
        cluster.avg_confidence = mean(confidences);
        Ok(())
    }

    pub fn cluster_of(&self, event_key: &str) -> Option<&SemanticCluster> {
        self.by_key
            .get(event_key)
            .and_then(|&id| self.clusters.get(id as usize))
            .and_then(Option::as_ref)
    }

    pub fn get(&self, id: ClusterId) -> Option<&SemanticCluster> {
        self.clusters.get(id as usize).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SemanticCluster> {
        self.clusters.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.clusters.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cosine_similarity() {
        let a = [1.0f32, 0.0, 0.0];
        let b = [1.0f32, 0.0, 0.0];
        let c = [0.0f32, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let a = [1.0f32, 0.0];
        let b = [1.0f32, 0.0, 0.0];
        assert!(matches!(
            cosine_similarity(&a, &b),
            Err(ClusterError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_vector_is_dissimilar() {
        let a = [0.0f32, 0.0];
        let b = [1.0f32, 0.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_assign_groups_similar_events() {
        let now = Utc::now();
        let mut clusterer = SemanticClusterer::new(0.8);

        let a = clusterer.assign("healthcare-bill", &[1.0, 0.1, 0.0], now).unwrap();
        let b = clusterer
            .assign("hospital-funding", &[0.95, 0.15, 0.0], now)
            .unwrap();
        let c = clusterer
            .assign("transit-strike", &[0.0, 0.0, 1.0], now)
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(clusterer.len(), 2);
    }

    #[test]
    fn test_assign_is_idempotent() {
        let now = Utc::now();
        let mut clusterer = SemanticClusterer::new(0.8);
        let a = clusterer.assign("k", &[1.0, 0.0], now).unwrap();
        let b = clusterer.assign("k", &[1.0, 0.0], now).unwrap();
        assert_eq!(a, b);
        assert_eq!(clusterer.len(), 1);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let now = Utc::now();
        let later = now + Duration::minutes(2);

        let build = || {
            let mut c = SemanticClusterer::new(0.99);
            c.assign("first-event", &[1.0, 0.0], now).unwrap();
            c.assign("second-event", &[0.0, 1.0], later).unwrap();
            c
        };

        let mut ab = build();
        let winner_ab = ab.merge(0, 1).unwrap();
        let mut ba = build();
        let winner_ba = ba.merge(1, 0).unwrap();

        assert_eq!(winner_ab, winner_ba);
        assert_eq!(
            ab.cluster_of("second-event").unwrap().id,
            ba.cluster_of("second-event").unwrap().id
        );
    }

    #[test]
    fn test_update_stats() {
        let now = Utc::now();
        let mut clusterer = SemanticClusterer::new(0.8);
        let id = clusterer.assign("k", &[1.0, 0.0], now).unwrap();
        clusterer.update_stats(id, &[2.0, 4.0], &[0.5, 0.7]).unwrap();
        let cluster = clusterer.get(id).unwrap();
        assert!((cluster.avg_velocity - 3.0).abs() < 1e-9);
        assert!((cluster.avg_confidence - 0.6).abs() < 1e-9);
    }
}
