//! RunPod serverless job loop.
//!
//! The platform hands out one job at a time: `GET` on the job-take URL
//! returns `{id, input}` (or 204 when idle), and the handler's output is
//! `POST`ed back as `{"output": ...}` to the job-done URL.

use std::time::Duration;

use ltx_models::{JobId, JobResponse};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::handler::JobHandler;
use crate::metrics;
use crate::retry::{deliver, DeliveryPolicy, PollFailures};

/// Placeholder the platform puts in its webhook URLs.
const ID_PLACEHOLDER: &str = "$ID";

/// Serverless endpoint configuration.
#[derive(Debug, Clone)]
pub struct RunpodConfig {
    /// Job-take URL, `$ID` standing for the pod id
    pub get_job_url: String,
    /// Job-done URL, `$ID` standing for the job id
    pub post_output_url: String,
    pub api_key: Option<String>,
    pub pod_id: String,
    /// Pause between polls when no job is waiting
    pub idle_delay: Duration,
    /// Pause after a failed poll
    pub error_delay: Duration,
}

impl RunpodConfig {
    /// Read the serverless endpoints, or `None` when not running on the platform.
    pub fn from_env() -> Option<Self> {
        let get_job_url = std::env::var("RUNPOD_WEBHOOK_GET_JOB").ok()?;
        let post_output_url = std::env::var("RUNPOD_WEBHOOK_POST_OUTPUT").ok()?;

        Some(Self {
            get_job_url,
            post_output_url,
            api_key: std::env::var("RUNPOD_AI_API_KEY").ok(),
            pod_id: std::env::var("RUNPOD_POD_ID").unwrap_or_else(|_| "local".to_string()),
            idle_delay: Duration::from_millis(
                std::env::var("RUNPOD_IDLE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            error_delay: Duration::from_secs(5),
        })
    }

    pub fn job_take_url(&self) -> String {
        self.get_job_url.replace(ID_PLACEHOLDER, &self.pod_id)
    }

    pub fn job_done_url(&self, job_id: &str) -> String {
        self.post_output_url
            .replace(ID_PLACEHOLDER, &urlencoding::encode(job_id))
    }
}

/// A job handed out by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct RunpodJob {
    pub id: String,
    #[serde(default)]
    pub input: Value,
}

/// HTTP client for the serverless job API.
#[derive(Clone)]
pub struct RunpodClient {
    http: Client,
    config: RunpodConfig,
}

impl RunpodClient {
    pub fn new(config: RunpodConfig) -> WorkerResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RunpodConfig {
        &self.config
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(AUTHORIZATION, key),
            None => request,
        }
    }

    /// Take the next job, if one is waiting.
    pub async fn next_job(&self) -> WorkerResult<Option<RunpodJob>> {
        let response = self
            .authorized(self.http.get(self.config.job_take_url()))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::runpod(format!("job-take returned {}: {}", status, body)));
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let job: RunpodJob = serde_json::from_slice(&body)
            .map_err(|e| WorkerError::runpod(format!("malformed job: {}", e)))?;
        Ok(Some(job))
    }

    /// Report a job's output.
    pub async fn post_output(&self, job_id: &str, output: &JobResponse) -> WorkerResult<()> {
        let response = self
            .authorized(self.http.post(self.config.job_done_url(job_id)))
            .json(&json!({ "output": output }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::runpod(format!("job-done returned {}: {}", status, body)));
        }
        Ok(())
    }
}

/// Polls for jobs and runs them one at a time.
pub struct ServerlessWorker {
    client: RunpodClient,
    handler: JobHandler,
    delivery: DeliveryPolicy,
}

impl ServerlessWorker {
    pub fn new(client: RunpodClient, handler: JobHandler) -> Self {
        Self {
            client,
            handler,
            delivery: DeliveryPolicy::default(),
        }
    }

    pub fn with_delivery_policy(mut self, delivery: DeliveryPolicy) -> Self {
        self.delivery = delivery;
        self
    }

    /// Take and run at most one job. Returns whether a job was processed.
    pub async fn poll_once(&self) -> WorkerResult<bool> {
        let Some(job) = self.client.next_job().await? else {
            return Ok(false);
        };

        info!(job_id = %job.id, "Received job");
        let job_id = JobId::from_string(job.id.clone());
        let output = self.handler.handle(&job_id, job.input).await;

        let delivered = deliver(&self.delivery, job_id.as_str(), || {
            self.client.post_output(job_id.as_str(), &output)
        })
        .await;

        match delivered {
            Ok(1) => debug!(job_id = %job_id, "Output delivered"),
            Ok(sends) => info!(job_id = %job_id, "Output delivered after {} attempts", sends),
            Err(e) => error!(job_id = %job_id, "Failed to deliver job output: {}", e),
        }
        Ok(true)
    }

    /// Run until `shutdown` flips to true. A job in flight always finishes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        info!("Worker ready to accept jobs");
        let mut failures = PollFailures::new(5);

        while !*shutdown.borrow() {
            let delay = match self.poll_once().await {
                Ok(true) => {
                    failures.record_success();
                    continue;
                }
                Ok(false) => {
                    failures.record_success();
                    self.client.config().idle_delay
                }
                Err(e) => {
                    metrics::record_poll_error();
                    if failures.record_failure() {
                        warn!("Job poll failed: {}", e);
                    }
                    self.client.config().error_delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    debug!("Shutdown requested while idle");
                }
            }
        }

        info!("Serverless loop stopped");
        Ok(())
    }
}
