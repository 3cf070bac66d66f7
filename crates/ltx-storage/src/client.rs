//! Supabase Storage REST client.

use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for the Supabase client.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL (e.g. https://xyz.supabase.co)
    pub url: String,
    /// Service role key
    pub service_role_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_role_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SupabaseConfig {
    pub fn new(
        url: impl Into<String>,
        service_role_key: impl Into<String>,
        bucket_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            service_role_key: service_role_key.into(),
            bucket_name: bucket_name.into(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| StorageError::config_error("SUPABASE_URL not set"))?;
        let key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| StorageError::config_error("SUPABASE_SERVICE_ROLE_KEY not set"))?;
        let bucket =
            std::env::var("SUPABASE_BUCKET").unwrap_or_else(|_| "ltx2-outputs".to_string());

        Ok(Self::new(url, key, bucket))
    }

    /// Base URL of the storage API.
    pub fn storage_url(&self) -> String {
        format!("{}/storage/v1", self.url.trim_end_matches('/'))
    }
}

/// Supabase Storage client bound to one bucket.
#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    storage_url: String,
    bucket: String,
}

impl SupabaseClient {
    /// Create a new client from configuration.
    pub fn new(config: SupabaseConfig) -> StorageResult<Self> {
        if config.url.trim().is_empty() {
            return Err(StorageError::config_error("SUPABASE_URL is empty"));
        }
        if config.service_role_key.trim().is_empty() {
            return Err(StorageError::config_error("SUPABASE_SERVICE_ROLE_KEY is empty"));
        }

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_role_key))
            .map_err(|e| StorageError::config_error(format!("invalid service role key: {}", e)))?;
        let apikey = HeaderValue::from_str(&config.service_role_key)
            .map_err(|e| StorageError::config_error(format!("invalid service role key: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("apikey", apikey);

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .user_agent(concat!("ltx-storage/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            storage_url: config.storage_url(),
            bucket: config.bucket_name,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(SupabaseConfig::from_env()?)
    }

    /// Bucket this client writes to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a local file, reading it fully into memory first.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let data = tokio::fs::read(path).await?;
        self.upload_bytes(data, key, content_type).await?;

        info!("Uploaded {} to {}/{}", path.display(), self.bucket, key);
        Ok(())
    }

    /// Upload bytes, overwriting any existing object at `key`.
    pub async fn upload_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let url = format!("{}/object/{}/{}", self.storage_url, self.bucket, encode_key(key)?);
        debug!("Uploading {} bytes to {}", data.len(), url);

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .header("cache-control", "max-age=3600")
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        check_status(response)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;
        Ok(())
    }

    /// Permanent URL for an object in a public bucket. No request is made.
    pub fn public_url(&self, key: &str) -> StorageResult<String> {
        Ok(format!(
            "{}/object/public/{}/{}",
            self.storage_url,
            self.bucket,
            encode_key(key)?
        ))
    }

    /// Create a time-limited signed download URL.
    pub async fn create_signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let url = format!(
            "{}/object/sign/{}/{}",
            self.storage_url,
            self.bucket,
            encode_key(key)?
        );

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "expiresIn": expires_in.as_secs() }))
            .send()
            .await
            .map_err(|e| StorageError::sign_failed(e.to_string()))?;

        let response = check_status(response)
            .await
            .map_err(|e| StorageError::sign_failed(e.to_string()))?;
        let body: Value = response.json().await?;

        let signed = extract_signed_url(&body).ok_or_else(|| {
            StorageError::sign_failed(format!("no signed URL in response: {}", body))
        })?;

        Ok(self.absolute_url(signed))
    }

    /// Check connectivity and credentials by fetching the bucket.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        let url = format!("{}/bucket/{}", self.storage_url, self.bucket);
        let response = self.http.get(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.storage_url, url.trim_start_matches('/'))
        }
    }
}

/// Signed URL responses have used several key spellings across API versions.
fn extract_signed_url(body: &Value) -> Option<&str> {
    ["signedURL", "signedUrl", "signed_url", "url"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Percent-encode each path segment of an object key.
fn encode_key(key: &str) -> StorageResult<String> {
    let key = key.trim_matches('/');
    if key.is_empty() {
        return Err(StorageError::invalid_key("empty object key"));
    }
    if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(StorageError::invalid_key(key.to_string()));
    }

    Ok(key
        .split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

async fn check_status(response: Response) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::from_status(status.as_u16(), body))
}
