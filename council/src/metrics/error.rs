//! Error types for the metrics store.

use std::path::PathBuf;

/// Errors from loading or persisting metrics.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Reading or writing the metrics file failed.
    #[error("Metrics IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Metrics could not be encoded as JSON.
    #[error("Failed to serialize metrics: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The metrics file exists but is not a valid metrics document.
    #[error("Invalid metrics document {path}: {source}")]
    Deserialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result type alias for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;
