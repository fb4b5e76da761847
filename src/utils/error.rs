//! Error Handling Module
//!
//! Error type shared by the data pipeline, the models, the distillation loop
//! and the output writers. The binary wraps these in `anyhow` at the top.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for distillation runs
#[derive(Error, Debug)]
pub enum DistillError {
    /// Malformed or missing dataset files
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Model construction or record loading failed
    #[error("Model error: {0}")]
    Model(String),

    /// Writing or reading a checkpoint failed
    #[error("Checkpoint error at '{0}': {1}")]
    Checkpoint(PathBuf, String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Convenience Result type for distillation operations
pub type Result<T> = std::result::Result<T, DistillError>;

impl From<serde_json::Error> for DistillError {
    fn from(err: serde_json::Error) -> Self {
        DistillError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for DistillError {
    fn from(err: toml::de::Error) -> Self {
        DistillError::Config(err.to_string())
    }
}
