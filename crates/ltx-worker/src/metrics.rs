//! Prometheus metrics for the worker.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> WorkerResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| WorkerError::config_error(format!("failed to install metrics recorder: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "ltx_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "ltx_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "ltx_job_duration_seconds";
    pub const GENERATION_DURATION_SECONDS: &str = "ltx_generation_duration_seconds";
    pub const ENCODE_DURATION_SECONDS: &str = "ltx_encode_duration_seconds";
    pub const UPLOAD_DURATION_SECONDS: &str = "ltx_upload_duration_seconds";
    pub const POLL_ERRORS_TOTAL: &str = "ltx_poll_errors_total";
}

pub fn record_job_completed(mode: &str, duration_secs: f64) {
    let labels = [("mode", mode.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_failed(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_generation_duration(mode: &str, duration_secs: f64) {
    let labels = [("mode", mode.to_string())];
    histogram!(names::GENERATION_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_encode_duration(duration_secs: f64) {
    histogram!(names::ENCODE_DURATION_SECONDS).record(duration_secs);
}

pub fn record_upload_duration(duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_poll_error() {
    counter!(names::POLL_ERRORS_TOTAL).increment(1);
}
