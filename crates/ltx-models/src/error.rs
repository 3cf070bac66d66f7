//! Validation error types.

use thiserror::Error;

/// Result type for input validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors raised while validating a job payload.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Missing or mistyped fields.
    #[error("{0}")]
    Schema(#[from] serde_json::Error),

    /// Field-level constraint violations.
    #[error("{0}")]
    Fields(#[from] validator::ValidationErrors),

    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("i2v mode requires either image_url or image_base64")]
    MissingImage,

    #[error("i2v mode accepts only one of image_url or image_base64")]
    AmbiguousImage,
}

impl ValidationError {
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}
