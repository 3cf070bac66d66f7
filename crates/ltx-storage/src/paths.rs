//! Object key layout.

use chrono::NaiveDate;
use ltx_models::is_safe_segment;

use crate::error::{StorageError, StorageResult};

/// Build the object key `{prefix}/{YYYY-MM-DD}/{job_id}/{file_name}`.
///
/// An empty prefix is skipped rather than producing a leading slash. The job
/// id must be a single `[A-Za-z0-9._-]` segment and the file name must not
/// contain separators or `..`.
pub fn object_key(
    prefix: &str,
    date: NaiveDate,
    job_id: &str,
    file_name: &str,
) -> StorageResult<String> {
    if !is_safe_segment(job_id) {
        return Err(StorageError::invalid_key(format!("job id '{}'", job_id)));
    }
    if file_name.is_empty()
        || file_name.contains('/')
        || file_name.contains('\\')
        || file_name.contains("..")
    {
        return Err(StorageError::invalid_key(format!("file name '{}'", file_name)));
    }

    let date = date.format("%Y-%m-%d").to_string();
    let prefix = prefix.trim_matches('/');

    Ok([prefix, date.as_str(), job_id, file_name]
        .iter()
        .filter(|segment| !segment.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/"))
}
