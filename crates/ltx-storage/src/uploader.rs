//! Video upload with URL resolution.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use ltx_models::{OutputFormat, StorageResult as StoredVideo};
use tracing::{info, warn};

use crate::client::SupabaseClient;
use crate::error::StorageResult;
use crate::paths::object_key;

/// Default signed URL lifetime (one day).
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 86_400;

/// Bucket-level upload options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Key prefix inside the bucket
    pub prefix: String,
    /// Whether the bucket serves objects publicly
    pub public: bool,
    /// Signed URL lifetime; 0 disables signing
    pub signed_url_ttl_secs: u64,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            prefix: "ltx2".to_string(),
            public: false,
            signed_url_ttl_secs: DEFAULT_SIGNED_URL_TTL_SECS,
        }
    }
}

impl UploadOptions {
    /// Read `SUPABASE_PREFIX`, `SUPABASE_PUBLIC` and `SUPABASE_SIGNED_URL_TTL_SECONDS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            prefix: std::env::var("SUPABASE_PREFIX").unwrap_or(defaults.prefix),
            public: std::env::var("SUPABASE_PUBLIC")
                .map(|v| v.trim().to_lowercase() == "true")
                .unwrap_or(defaults.public),
            signed_url_ttl_secs: std::env::var("SUPABASE_SIGNED_URL_TTL_SECONDS")
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .map(|ttl| ttl.max(0) as u64)
                .unwrap_or(defaults.signed_url_ttl_secs),
        }
    }

    /// Decide which URL to return for an upload.
    pub fn url_policy(&self, want_signed: bool) -> UrlPolicy {
        if self.public {
            UrlPolicy::Public
        } else if want_signed && self.signed_url_ttl_secs > 0 {
            UrlPolicy::Signed(Duration::from_secs(self.signed_url_ttl_secs))
        } else {
            UrlPolicy::None
        }
    }
}

/// Which URL an upload resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlPolicy {
    Public,
    Signed(Duration),
    None,
}

/// Uploads encoded videos and resolves their download URL.
#[derive(Clone)]
pub struct VideoUploader {
    client: SupabaseClient,
    options: UploadOptions,
}

impl VideoUploader {
    pub fn new(client: SupabaseClient, options: UploadOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    pub fn client(&self) -> &SupabaseClient {
        &self.client
    }

    /// Object key for a job's video, dated today (UTC).
    pub fn key_for(&self, job_id: &str, file_name: &str) -> StorageResult<String> {
        object_key(&self.options.prefix, Utc::now().date_naive(), job_id, file_name)
    }

    /// Upload a local video and resolve its URL.
    pub async fn upload_video(
        &self,
        local_path: impl AsRef<Path>,
        job_id: &str,
        file_name: &str,
        format: OutputFormat,
        want_signed: bool,
    ) -> StorageResult<StoredVideo> {
        let key = self.key_for(job_id, file_name)?;
        info!(job_id = %job_id, key = %key, "Uploading video to Supabase");

        self.client
            .upload_file(local_path, &key, format.content_type())
            .await?;

        let mut stored = StoredVideo::new(self.client.bucket(), key.clone());
        match self.options.url_policy(want_signed) {
            UrlPolicy::Public => {
                stored.public_url = Some(self.client.public_url(&key)?);
            }
            UrlPolicy::Signed(ttl) => {
                stored.signed_url = Some(self.client.create_signed_url(&key, ttl).await?);
            }
            UrlPolicy::None => {
                warn!(job_id = %job_id, "Private bucket without signed URL; returning path only");
            }
        }

        Ok(stored)
    }
}
