//! Worker error types.

use ltx_models::ValidationError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serverless API error: {0}")]
    Runpod(String),

    #[error(transparent)]
    Pipeline(#[from] ltx_pipeline::PipelineError),

    #[error(transparent)]
    Media(#[from] ltx_media::MediaError),

    #[error(transparent)]
    Storage(#[from] ltx_storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn runpod(msg: impl Into<String>) -> Self {
        Self::Runpod(msg.into())
    }

    /// Failure stage, used as a metrics label.
    pub fn stage(&self) -> &'static str {
        match self {
            WorkerError::Validation(_) => "validation",
            WorkerError::Pipeline(_) => "generation",
            WorkerError::Media(_) => "media",
            WorkerError::Storage(_) => "upload",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Runpod(_) | WorkerError::Http(_) => "transport",
            WorkerError::Io(_) => "io",
        }
    }
}
