//! Job output payloads.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::job::Mode;

/// Where the uploaded video landed.
///
/// At most one of `signed_url` / `public_url` is set; both are `None` when
/// the bucket is private and signed URLs are disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StorageResult {
    pub bucket: String,
    pub path: String,
    pub signed_url: Option<String>,
    pub public_url: Option<String>,
}

impl StorageResult {
    /// Result with no URL resolved yet.
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
            signed_url: None,
            public_url: None,
        }
    }

    /// The URL a caller should use, if any.
    pub fn url(&self) -> Option<&str> {
        self.signed_url.as_deref().or(self.public_url.as_deref())
    }
}

/// Successful job output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobOutput {
    pub ok: bool,
    pub mode: Mode,
    pub supabase: StorageResult,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl JobOutput {
    pub fn new(mode: Mode, supabase: StorageResult, meta: Map<String, Value>) -> Self {
        Self {
            ok: true,
            mode,
            supabase,
            meta,
        }
    }
}

/// Failed job output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    pub ok: bool,
    pub error: String,
}

impl JobFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

/// Either outcome of a job, serialized without a wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum JobResponse {
    Success(JobOutput),
    Failure(JobFailure),
}

impl JobResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, JobResponse::Success(_))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "ok": false, "error": format!("Failed to serialize output: {}", e) })
        })
    }
}

impl From<JobOutput> for JobResponse {
    fn from(output: JobOutput) -> Self {
        JobResponse::Success(output)
    }
}

impl From<JobFailure> for JobResponse {
    fn from(failure: JobFailure) -> Self {
        JobResponse::Failure(failure)
    }
}
