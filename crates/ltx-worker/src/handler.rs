//! Job handler: validate, generate, shape the response.

use std::sync::Arc;
use std::time::Instant;

use ltx_models::{JobFailure, JobId, JobInput, JobOutput, JobResponse};
use serde_json::{json, Value};
use tracing::Instrument;

use crate::engine::LtxEngine;
use crate::error::WorkerError;
use crate::logging::JobLogger;
use crate::metrics;

/// Turns raw job payloads into responses. Never fails; errors become
/// `{"ok": false, "error": ...}` payloads.
#[derive(Clone)]
pub struct JobHandler {
    engine: Arc<LtxEngine>,
}

impl JobHandler {
    pub fn new(engine: Arc<LtxEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &LtxEngine {
        &self.engine
    }

    pub async fn handle(&self, job_id: &JobId, raw: Value) -> JobResponse {
        let start = Instant::now();
        let logger = JobLogger::new(job_id, "job");
        logger.log_start("processing");

        let job = match job_id.validate().and_then(|()| JobInput::parse(raw)) {
            Ok(job) => job,
            Err(e) => {
                let err = WorkerError::from(e);
                logger.log_error(&err.to_string());
                metrics::record_job_failed(err.stage());
                return JobFailure::new(err.to_string()).into();
            }
        };

        let mode = job.mode();
        let result = self
            .engine
            .generate(job_id, &job)
            .instrument(logger.create_span())
            .await;

        match result {
            Ok(generated) => {
                let elapsed = start.elapsed().as_secs_f64();
                let mut meta = generated.meta;
                meta.insert("inference_seconds".into(), json!(round_millis(elapsed)));

                metrics::record_job_completed(mode.as_str(), elapsed);
                logger.log_completion(elapsed);
                JobOutput::new(mode, generated.storage, meta).into()
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                metrics::record_job_failed(e.stage());
                JobFailure::new(e.to_string()).into()
            }
        }
    }
}

/// Round seconds to three decimals.
fn round_millis(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}
