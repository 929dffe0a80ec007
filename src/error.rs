//! Unified error handling for the pado crate
//!
//! Domain-specific errors live next to the code that raises them; this module
//! consolidates them into a single [`Error`] enum for use across module
//! boundaries, with a category classification for handling strategies.
//!
//! Not everything surprising is an error here: an insufficient baseline means
//! "unclassified", a stale projection means "recompute", and a deferred batch
//! subset means a degraded (not failed) pass. Only storage failures are fatal
//! to an enclosing pass.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::baseline::BaselineError;
pub use crate::clustering::ClusterError;
pub use crate::normalizer::EvidenceError;
pub use crate::pipeline::PipelineError;
pub use crate::projector::ProjectionError;
pub use crate::store::StoreError;

/// Common interface implemented by pado error types
pub trait EngineError: std::error::Error {
    /// Check if this error is recoverable (safe to retry)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Evidence validation and ingestion errors
    Ingest,
    /// Baseline/statistical computation errors
    Statistics,
    /// Phrase/semantic clustering errors
    Clustering,
    /// Storage and I/O errors
    Storage,
    /// Org relevance projection errors
    Projection,
    /// Batch pass orchestration errors
    Pipeline,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Statistics => "statistics",
            Self::Clustering => "clustering",
            Self::Storage => "storage",
            Self::Projection => "projection",
            Self::Pipeline => "pipeline",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the pado crate
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unacceptable incoming evidence
    #[error("Evidence error: {0}")]
    Evidence(#[from] EvidenceError),

    /// Baseline estimation errors
    #[error("Baseline error: {0}")]
    Baseline(#[from] BaselineError),

    /// Clustering errors
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Org projection errors
    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// Pipeline orchestration errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl EngineError for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            // Bad evidence never becomes good on retry
            Self::Evidence(_) => false,
            // Insufficient data recovers as more evidence arrives
            Self::Baseline(_) => true,
            Self::Cluster(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Projection(_) => false,
            Self::Pipeline(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Evidence(_) => ErrorCategory::Ingest,
            Self::Baseline(_) => ErrorCategory::Statistics,
            Self::Cluster(_) => ErrorCategory::Clustering,
            Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Projection(_) => ErrorCategory::Projection,
            Self::Pipeline(_) => ErrorCategory::Pipeline,
            Self::Json(_) => ErrorCategory::Ingest,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_error_category() {
        let err = Error::Evidence(EvidenceError::EmptyContent);
        assert_eq!(err.category(), ErrorCategory::Ingest);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("bad threshold");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_baseline_error_recoverable() {
        let err = Error::Baseline(BaselineError::InsufficientBaseline {
            topic: "t".to_string(),
            data_points: 1,
            required: 24,
        });
        assert_eq!(err.category(), ErrorCategory::Statistics);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let evidence_err = EvidenceError::MissingTimestamp;
        let unified: Error = evidence_err.into();
        assert!(matches!(unified, Error::Evidence(_)));
    }
}
