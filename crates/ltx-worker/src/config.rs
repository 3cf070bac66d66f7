//! Worker configuration.

use std::path::PathBuf;

use ltx_pipeline::{LoadSpec, Precision, RemoteConfig, DEFAULT_CACHE_DIR};
use ltx_storage::{SupabaseConfig, UploadOptions};

use crate::error::{WorkerError, WorkerResult};

/// Model loading settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    /// Hub model name
    pub model_name: String,
    /// Target device (e.g. "cuda")
    pub device: String,
    /// Weight dtype as configured; see [`ModelSettings::precision`]
    pub dtype: String,
    /// Root of the pre-fetched model cache
    pub cache_dir: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_name: "Lightricks/LTX-2".to_string(),
            device: "cuda".to_string(),
            dtype: "float16".to_string(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

impl ModelSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_name: std::env::var("MODEL_NAME").unwrap_or(defaults.model_name),
            device: std::env::var("DEVICE").unwrap_or(defaults.device),
            dtype: std::env::var("DTYPE").unwrap_or(defaults.dtype),
            cache_dir: std::env::var("MODEL_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
        }
    }

    pub fn precision(&self) -> Precision {
        Precision::from_dtype(&self.dtype)
    }

    /// Load spec for `source` (snapshot path or model name).
    pub fn load_spec(&self, source: impl Into<String>) -> LoadSpec {
        LoadSpec {
            source: source.into(),
            precision: self.precision(),
            device: self.device.clone(),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub model: ModelSettings,
    pub supabase: SupabaseConfig,
    pub upload: UploadOptions,
    pub inference: RemoteConfig,
    /// Work directory for encoded videos
    pub work_dir: PathBuf,
    /// Kill FFmpeg after this many seconds
    pub encode_timeout_secs: u64,
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// Fails when the Supabase URL or service role key is missing.
    pub fn from_env() -> WorkerResult<Self> {
        let supabase = SupabaseConfig::from_env()
            .map_err(|e| WorkerError::config_error(e.to_string()))?;

        Ok(Self {
            model: ModelSettings::from_env(),
            supabase,
            upload: UploadOptions::from_env(),
            inference: RemoteConfig::from_env(),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/ltx2")),
            encode_timeout_secs: std::env::var("WORKER_ENCODE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "MODEL_NAME",
        "DEVICE",
        "DTYPE",
        "MODEL_CACHE_DIR",
        "SUPABASE_URL",
        "SUPABASE_SERVICE_ROLE_KEY",
        "SUPABASE_BUCKET",
        "SUPABASE_PREFIX",
        "SUPABASE_PUBLIC",
        "SUPABASE_SIGNED_URL_TTL_SECONDS",
        "WORKER_WORK_DIR",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        std::env::set_var("SUPABASE_URL", "https://x.supabase.co");
        std::env::set_var("SUPABASE_SERVICE_ROLE_KEY", "key");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.model.model_name, "Lightricks/LTX-2");
        assert_eq!(config.model.device, "cuda");
        assert_eq!(config.model.precision(), Precision::Float16);
        assert_eq!(config.supabase.bucket_name, "ltx2-outputs");
        assert_eq!(config.upload.prefix, "ltx2");
        assert!(!config.upload.public);
        assert_eq!(config.upload.signed_url_ttl_secs, 86_400);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/ltx2"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_supabase_is_error() {
        clear_env();
        std::env::set_var("SUPABASE_URL", "https://x.supabase.co");

        let err = WorkerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SUPABASE_SERVICE_ROLE_KEY"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        std::env::set_var("SUPABASE_URL", "https://x.supabase.co");
        std::env::set_var("SUPABASE_SERVICE_ROLE_KEY", "key");
        std::env::set_var("DTYPE", "bfloat16");
        std::env::set_var("SUPABASE_PUBLIC", "TRUE");
        std::env::set_var("SUPABASE_SIGNED_URL_TTL_SECONDS", "0");
        std::env::set_var("SUPABASE_PREFIX", "renders");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.model.precision(), Precision::BFloat16);
        assert!(config.upload.public);
        assert_eq!(config.upload.signed_url_ttl_secs, 0);
        assert_eq!(config.upload.prefix, "renders");

        clear_env();
    }

    #[test]
    fn test_load_spec() {
        let spec = ModelSettings::default().load_spec("/cache/snap");
        assert_eq!(spec.source, "/cache/snap");
        assert_eq!(spec.precision, Precision::Float16);
        assert_eq!(spec.device, "cuda");
    }
}
