//! Fast-path deduplication for evidence ingestion
//!
//! Re-delivery of the same source item must not double-count. The
//! authoritative dedupe check is the (content_hash, source_type) lookup in
//! the evidence store; this bloom filter sits in front of it so that the
//! common case (never seen) skips the storage read entirely.
//!
//! A bloom "maybe" still goes to the store; false positives cost one read,
//! never a dropped record.

use bloomfilter::Bloom;

use crate::models::SourceType;

/// Default expected item count for the filter
const DEFAULT_CAPACITY: usize = 100_000;

/// Target false-positive rate
const FP_RATE: f64 = 0.001;

/// In-memory dedup fast path over (content_hash, source_type) keys
pub struct DedupFilter {
    bloom: Bloom<String>,
    inserted: u64,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bloom: Bloom::new_for_fp_rate(capacity.max(1), FP_RATE),
            inserted: 0,
        }
    }

    fn key(content_hash: &str, source_type: SourceType) -> String {
        format!("{content_hash}:{}", source_type.as_str())
    }

    /// Whether this key has possibly been seen before.
    ///
    /// `false` is definitive (skip the store lookup); `true` requires the
    /// authoritative store check.
    pub fn maybe_seen(&self, content_hash: &str, source_type: SourceType) -> bool {
        self.bloom.check(&Self::key(content_hash, source_type))
    }

    /// Record a key as seen
    pub fn insert(&mut self, content_hash: &str, source_type: SourceType) {
        self.bloom.set(&Self::key(content_hash, source_type));
        self.inserted += 1;
    }

    /// Number of keys inserted since creation
    pub fn len(&self) -> u64 {
        self.inserted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }
}

impl Default for DedupFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_key_is_definitive() {
        let filter = DedupFilter::new();
        assert!(!filter.maybe_seen("abc", SourceType::News));
    }

    #[test]
    fn test_inserted_key_is_maybe_seen() {
        let mut filter = DedupFilter::new();
        filter.insert("abc", SourceType::News);
        assert!(filter.maybe_seen("abc", SourceType::News));
    }

    #[test]
    fn test_source_type_is_part_of_key() {
        let mut filter = DedupFilter::new();
        filter.insert("abc", SourceType::News);
        // same hash from a different source type is a separate observation
        assert!(!filter.maybe_seen("abc", SourceType::Social));
    }

    #[test]
    fn test_len_tracks_inserts() {
        let mut filter = DedupFilter::new();
        assert!(filter.is_empty());
        filter.insert("a", SourceType::News);
        filter.insert("b", SourceType::Press);
        assert_eq!(filter.len(), 2);
    }
}
