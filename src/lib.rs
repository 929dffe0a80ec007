//! pado - Media trend detection and organization relevance scoring engine
//!
//! pado ingests mention records (news articles, social posts, press
//! releases) from heterogeneous collectors, detects statistically
//! significant bursts of attention around entities/topics/phrases, merges
//! near-duplicate labels into canonical trend events, scores them for
//! confidence and label quality, and projects every event onto each
//! subscribing organization's interest profile.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management, detection thresholds, weights
//! - [`models`] - Core data structures and types
//! - [`normalizer`] - Evidence validation, canonicalization, deduplication
//! - [`baseline`] - Rolling per-topic mention-rate baselines
//! - [`velocity`] - Velocity, z-score, Poisson surprise, burst classification
//! - [`clustering`] - Phrase and semantic clustering into canonical events
//! - [`scoring`] - Confidence composite and label quality
//! - [`store`] - Durable trend event store and lifecycle state machine
//! - [`projector`] - Per-organization relevance projection
//! - [`pipeline`] - Scheduled batch pass orchestration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pado::config::Config;
//! use pado::pipeline::Pipeline;
//! use pado::store::{MemoryStore, TrendStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let store = TrendStore::new(Arc::new(MemoryStore::new()), &config);
//! let pipeline = Pipeline::new(store, &config, Vec::new());
//! // pipeline.run_cycle(batch, run_id, Utc::now())?;
//! # Ok(())
//! # }
//! ```

pub mod baseline;
pub mod clustering;
pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod projector;
pub mod scoring;
pub mod store;
pub mod utils;
pub mod velocity;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{EngineError, Error, ErrorCategory, Result};
    pub use crate::models::{
        MentionEvidence, NewEvidence, SourceTier, SourceType, TrendEvent, TrendStage,
    };
    pub use crate::pipeline::Pipeline;
    pub use crate::projector::{OrgProfile, OrgTrendScore, PriorityBucket};
    pub use crate::store::{TrendFilter, TrendStore};
}

// Direct re-exports for convenience
pub use models::{MentionEvidence, NewEvidence, TrendEvent, TrendStage};
