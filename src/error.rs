//! Error types for the retrieval optimizer.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, OptimizeError>;

/// Errors that can occur while evaluating or tuning a search configuration.
#[derive(Error, Debug)]
pub enum OptimizeError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A data file does not exist or is not a regular file.
    #[error("Data file not found at '{0}'")]
    DataNotFound(PathBuf),

    /// A raw or labeled data file could not be parsed.
    #[error("Invalid data in '{path}': {message}")]
    DataFormat { path: PathBuf, message: String },

    /// Invalid run or study settings.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The vector index or result store rejected a request or is unreachable.
    #[error("Store error: {0}")]
    Store(String),

    /// A persisted result document was not found.
    #[error("No result stored under '{0}'")]
    ResultNotFound(String),

    /// Embedding generation failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The embedding provider is not available in this build.
    #[error("Unsupported embedding provider: {0}")]
    UnsupportedProvider(String),

    /// A model produced vectors of an unexpected size.
    #[error("Embedding dimension mismatch for '{model}': expected {expected}, got {actual}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),
}

impl OptimizeError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a data format error with path context.
    pub fn data_format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DataFormat {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for OptimizeError {
    fn from(err: reqwest::Error) -> Self {
        OptimizeError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for OptimizeError {
    fn from(err: serde_json::Error) -> Self {
        OptimizeError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for OptimizeError {
    fn from(err: redis::RedisError) -> Self {
        OptimizeError::Store(err.to_string())
    }
}
