//! Job input schema and validation.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ValidationError, ValidationResult};

/// Default file name for the uploaded video.
pub const DEFAULT_FILE_NAME: &str = "video.mp4";

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Timestamp-based ID for jobs that arrive without a platform ID.
    pub fn local() -> Self {
        Self(format!("job_{}", Utc::now().timestamp()))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ensure the id can be used as a single path segment.
    ///
    /// Ids name both the local job directory and a storage key segment, so
    /// only `[A-Za-z0-9._-]` is accepted and `..` is rejected.
    pub fn validate(&self) -> ValidationResult<()> {
        if is_safe_segment(&self.0) {
            Ok(())
        } else {
            Err(ValidationError::invalid_field(
                "job_id",
                format!("'{}' must be non-empty [A-Za-z0-9._-] without '..'", self.0),
            ))
        }
    }
}

/// Whether `s` is a non-empty `[A-Za-z0-9._-]` segment that contains no `..`.
pub fn is_safe_segment(s: &str) -> bool {
    !s.is_empty()
        && !s.contains("..")
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum Mode {
    /// Text-to-video
    #[default]
    #[serde(rename = "t2v")]
    TextToVideo,
    /// Image-to-video
    #[serde(rename = "i2v")]
    ImageToVideo,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::TextToVideo => "t2v",
            Mode::ImageToVideo => "i2v",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output container. Only MP4 is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
        }
    }
}

/// Input payload for a video generation job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct JobInput {
    #[serde(default)]
    pub mode: Mode,

    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,

    #[serde(default)]
    pub negative_prompt: Option<String>,

    // Generation parameters
    /// Signed like torch seeds; see [`JobInput::generator_seed`].
    #[serde(default)]
    pub seed: Option<i64>,

    #[serde(default = "default_steps")]
    #[validate(range(min = 1, max = 200))]
    pub steps: u32,

    #[serde(default = "default_guidance")]
    #[validate(range(min = 0.0, max = 50.0))]
    pub guidance: f32,

    // Video parameters
    #[serde(default = "default_fps")]
    #[validate(range(min = 1, max = 120))]
    pub fps: u32,

    #[serde(default = "default_num_frames")]
    #[validate(range(min = 1, max = 1000))]
    pub num_frames: u32,

    #[serde(default = "default_dimension")]
    #[validate(range(min = 64, max = 4096))]
    pub height: u32,

    #[serde(default = "default_dimension")]
    #[validate(range(min = 64, max = 4096))]
    pub width: u32,

    // Image conditioning (i2v only)
    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    pub image_base64: Option<String>,

    // Output settings
    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default = "default_true")]
    pub return_signed_url: bool,

    /// Trade latency for peak memory by offloading weights to the host.
    #[serde(default)]
    pub low_vram: bool,
}

fn default_steps() -> u32 {
    30
}
fn default_guidance() -> f32 {
    7.0
}
fn default_fps() -> u32 {
    24
}
fn default_num_frames() -> u32 {
    49
}
fn default_dimension() -> u32 {
    512
}
fn default_true() -> bool {
    true
}

impl JobInput {
    /// Parse and validate an untyped payload.
    pub fn parse(raw: serde_json::Value) -> ValidationResult<ValidatedJob> {
        let input: JobInput = serde_json::from_value(raw)?;
        input.into_validated()
    }

    /// Seed as the generator stores it. Negative seeds wrap like
    /// `torch.Generator.manual_seed`, so `-1` becomes `u64::MAX`.
    pub fn generator_seed(&self) -> Option<u64> {
        self.seed.map(|seed| seed as u64)
    }

    /// File name the video is stored under.
    pub fn file_name_or_default(&self) -> &str {
        self.file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME)
    }

    /// Run field and cross-field checks, resolving the conditioning image.
    pub fn into_validated(self) -> ValidationResult<ValidatedJob> {
        self.validate()?;

        if self.prompt.trim().is_empty() {
            return Err(ValidationError::invalid_field("prompt", "must not be blank"));
        }

        if let Some(name) = &self.file_name {
            validate_file_name(name, self.output_format)?;
        }

        let conditioning = match self.mode {
            Mode::TextToVideo => Conditioning::None,
            Mode::ImageToVideo => {
                let url = non_empty(self.image_url.as_deref());
                let b64 = non_empty(self.image_base64.as_deref());
                match (url, b64) {
                    (Some(url), None) => {
                        validate_image_url(url)?;
                        Conditioning::Image(ImageSource::Url(url.to_string()))
                    }
                    (None, Some(b64)) => Conditioning::Image(ImageSource::Base64(b64.to_string())),
                    (None, None) => return Err(ValidationError::MissingImage),
                    (Some(_), Some(_)) => return Err(ValidationError::AmbiguousImage),
                }
            }
        };

        Ok(ValidatedJob {
            input: self,
            conditioning,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

fn validate_image_url(raw: &str) -> ValidationResult<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ValidationError::invalid_field("image_url", e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ValidationError::invalid_field(
            "image_url",
            format!("unsupported scheme '{}'", other),
        )),
    }
}

/// Reject names that would escape the job directory or change the container.
fn validate_file_name(name: &str, format: OutputFormat) -> ValidationResult<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(ValidationError::invalid_field(
            "file_name",
            "must be between 1 and 255 characters",
        ));
    }

    if name.contains('/') || name.contains('\\') || name.contains("..") || name.starts_with('.') {
        return Err(ValidationError::invalid_field(
            "file_name",
            "must be a bare file name",
        ));
    }

    let expected = format!(".{}", format.extension());
    if !name.to_lowercase().ends_with(&expected) {
        return Err(ValidationError::invalid_field(
            "file_name",
            format!("must end with {}", expected),
        ));
    }

    Ok(())
}

/// Where a conditioning image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Url(String),
    Base64(String),
}

/// Conditioning resolved for a validated job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditioning {
    None,
    Image(ImageSource),
}

impl Conditioning {
    pub fn image(&self) -> Option<&ImageSource> {
        match self {
            Conditioning::None => None,
            Conditioning::Image(source) => Some(source),
        }
    }
}

/// A job input that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedJob {
    pub input: JobInput,
    pub conditioning: Conditioning,
}

impl ValidatedJob {
    pub fn mode(&self) -> Mode {
        self.input.mode
    }
}
