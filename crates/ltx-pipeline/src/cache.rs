//! Pre-fetched model snapshot discovery.

use std::path::{Path, PathBuf};

use tracing::info;

/// Hub cache root mounted into serverless workers.
pub const DEFAULT_CACHE_DIR: &str = "/runpod-volume/huggingface-cache/hub";

/// Find the newest cached snapshot for `model_name` under `cache_dir`.
///
/// Snapshots live at `{cache_dir}/models--{org}--{name}/snapshots/{hash}`; the
/// lexicographically last entry wins.
pub fn find_cached_model_path(cache_dir: impl AsRef<Path>, model_name: &str) -> Option<PathBuf> {
    let cache_name = model_name.replace('/', "--");
    let snapshots_dir = cache_dir
        .as_ref()
        .join(format!("models--{}", cache_name))
        .join("snapshots");

    let mut snapshots: Vec<_> = std::fs::read_dir(&snapshots_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name())
        .collect();
    snapshots.sort();

    match snapshots.pop() {
        Some(latest) => {
            let path = snapshots_dir.join(latest);
            info!("Found cached model at: {}", path.display());
            Some(path)
        }
        None => {
            info!("Cached model not found, will download {} from the hub", model_name);
            None
        }
    }
}

/// Resolve the load source: the cached snapshot if present, otherwise the model name.
pub fn resolve_model_source(cache_dir: impl AsRef<Path>, model_name: &str) -> String {
    find_cached_model_path(cache_dir, model_name)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| model_name.to_string())
}
