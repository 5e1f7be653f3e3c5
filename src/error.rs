//! Error types for the autodrive-rl crate

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the autodrive-rl crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("unknown algorithm '{input}'. Expected one of: {expected}")]
    UnknownAlgorithm { input: String, expected: String },

    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("unsupported checkpoint version {found} in {path:?} (expected {expected})")]
    UnsupportedCheckpointVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("no checkpoint stored at {path:?}")]
    MissingCheckpoint { path: PathBuf },

    #[error("simulation error: {message}")]
    Simulation { message: String },

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to {operation}: {message}")]
    SerializationContext { operation: String, message: String },

    #[error("progress bar template error: {message}")]
    ProgressBarTemplate { message: String },
}

/// Convenience type alias for Results using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            operation: "IO operation".to_string(),
            source,
        }
    }
}

impl Error {
    /// Shorthand for configuration errors raised while validating input.
    pub fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            message: message.into(),
        }
    }
}
