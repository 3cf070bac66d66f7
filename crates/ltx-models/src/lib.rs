//! Shared data models for the LTX-2 video worker.
//!
//! This crate provides Serde-serializable types for:
//! - Job input schema, defaults and validation
//! - Job output and storage result payloads
//! - Encoding configuration

pub mod encoding;
pub mod error;
pub mod job;
pub mod output;

// Re-export common types
pub use encoding::EncodingConfig;
pub use error::{ValidationError, ValidationResult};
pub use job::{
    is_safe_segment, Conditioning, ImageSource, JobId, JobInput, Mode, OutputFormat,
    ValidatedJob, DEFAULT_FILE_NAME,
};
pub use output::{JobFailure, JobOutput, JobResponse, StorageResult};
