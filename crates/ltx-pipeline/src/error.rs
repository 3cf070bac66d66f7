//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The runtime does not provide this pipeline class.
    #[error("Pipeline class {0} is not available")]
    ClassUnavailable(String),

    #[error(
        "i2v mode requested but LTX2ImageToVideoPipeline is not available. \
         This may require a newer diffusion runtime."
    )]
    ImageToVideoUnavailable,

    #[error("Could not find frames/videos in pipeline output (keys: {})", .available.join(", "))]
    MissingOutput { available: Vec<String> },

    #[error("Inference service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to decode frame {index}: {message}")]
    FrameDecode { index: usize, message: String },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn class_unavailable(class: impl Into<String>) -> Self {
        Self::ClassUnavailable(class.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn frame_decode(index: usize, msg: impl Into<String>) -> Self {
        Self::FrameDecode {
            index,
            message: msg.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::ServiceUnavailable(_) | PipelineError::Timeout(_) => true,
            PipelineError::Network(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Whether a load failed because the class is missing, as opposed to a load error.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, PipelineError::ClassUnavailable(_))
    }
}
