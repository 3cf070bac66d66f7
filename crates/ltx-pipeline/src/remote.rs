//! HTTP client for the diffusion runtime.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::generator::Generator;
use crate::pipeline::{PipelineBackend, VideoPipeline};
use crate::types::{
    GenerationRequest, LoadSpec, OutputShape, OutputValue, PipelineClass, PipelineOutput,
};

/// Configuration for the runtime client.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the runtime
    pub base_url: String,
    /// Per-request timeout; generation can take minutes
    pub timeout: Duration,
    /// Retries for load-time requests
    pub max_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8188".to_string(),
            timeout: Duration::from_secs(1800),
            max_retries: 2,
        }
    }
}

impl RemoteConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("INFERENCE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("INFERENCE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("INFERENCE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreatePipelineRequest<'a> {
    class: &'a str,
    source: &'a str,
    dtype: &'a str,
    device: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatePipelineResponse {
    pipeline_id: String,
    #[serde(default)]
    output_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    num_inference_steps: u32,
    guidance_scale: f32,
    num_frames: u32,
    height: u32,
    width: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    generator: Option<&'a Generator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    output_type: &'static str,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}

/// Low-level runtime client shared by all remote pipelines.
pub struct RemoteClient {
    http: Client,
    config: RemoteConfig,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> PipelineResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(PipelineError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> PipelineResult<Self> {
        Self::new(RemoteConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Check if the runtime is healthy.
    pub async fn health_check(&self) -> PipelineResult<bool> {
        match self.http.get(self.url("/health")).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Inference runtime health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Inference runtime health check error: {}", e);
                Ok(false)
            }
        }
    }

    async fn create_pipeline(
        &self,
        class: PipelineClass,
        spec: &LoadSpec,
    ) -> PipelineResult<CreatePipelineResponse> {
        let url = self.url("/pipelines");
        let body = CreatePipelineRequest {
            class: class.as_str(),
            source: &spec.source,
            dtype: spec.precision.as_str(),
            device: &spec.device,
        };

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(PipelineError::Network)?;
                check_response(response, Some(class)).await
            })
            .await?;

        Ok(response.json().await?)
    }

    async fn set_option(&self, pipeline_id: &str, option: &str) -> PipelineResult<()> {
        let url = self.url(&format!("/pipelines/{}/options", pipeline_id));
        let mut body = serde_json::Map::new();
        body.insert(option.to_string(), Value::Bool(true));

        let response = self.http.post(&url).json(&body).send().await?;
        check_response(response, None).await?;
        Ok(())
    }

    async fn generate(
        &self,
        pipeline_id: &str,
        request: &GenerationRequest,
    ) -> PipelineResult<PipelineOutput> {
        let url = self.url(&format!("/pipelines/{}/generate", pipeline_id));
        let body = GenerateBody {
            prompt: &request.prompt,
            negative_prompt: request.negative_prompt.as_deref(),
            num_inference_steps: request.num_inference_steps,
            guidance_scale: request.guidance_scale,
            num_frames: request.num_frames,
            height: request.height,
            width: request.width,
            generator: request.generator.as_ref(),
            image: request.image.as_ref().map(encode_png_base64).transpose()?,
            output_type: "pil",
        };

        debug!("Sending generation request to {}", url);
        let response = self.http.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::Timeout(self.config.timeout.as_secs())
            } else {
                PipelineError::Network(e)
            }
        })?;
        let response = check_response(response, None).await?;

        let value: Value = response.json().await?;
        decode_output(value)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> PipelineResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = PipelineResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Inference request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Map non-success responses onto pipeline errors.
async fn check_response(
    response: Response,
    loading: Option<PipelineClass>,
) -> PipelineResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if let Some(class) = loading {
        if status == StatusCode::NOT_FOUND || body.contains("unsupported_class") {
            return Err(PipelineError::class_unavailable(class.as_str()));
        }
    }

    match status {
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => Err(
            PipelineError::ServiceUnavailable(format!("runtime returned {}: {}", status, body)),
        ),
        _ => Err(PipelineError::RequestFailed(format!(
            "runtime returned {}: {}",
            status, body
        ))),
    }
}

fn encode_png_base64(image: &RgbImage) -> PipelineResult<String> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| PipelineError::invalid_response(format!("failed to encode image: {}", e)))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}

fn decode_frame(index: usize, value: &Value) -> PipelineResult<DynamicImage> {
    let encoded = value
        .as_str()
        .ok_or_else(|| PipelineError::frame_decode(index, "frame is not a string"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| PipelineError::frame_decode(index, e.to_string()))?;
    image::load_from_memory(&bytes).map_err(|e| PipelineError::frame_decode(index, e.to_string()))
}

fn decode_sequence(values: &[Value]) -> PipelineResult<Vec<DynamicImage>> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| decode_frame(i, v))
        .collect()
}

/// Decode frame keys of a generate response; everything else is kept raw.
fn decode_output(value: Value) -> PipelineResult<PipelineOutput> {
    let Value::Object(map) = value else {
        return Err(PipelineError::invalid_response("generate response is not an object"));
    };

    let mut output = PipelineOutput::new();
    for (key, value) in map {
        let is_frame_key = OutputShape::from_key(&key).is_some();
        let decoded = match value {
            Value::Array(items) if is_frame_key && items.iter().all(Value::is_array) => {
                let batch = items
                    .iter()
                    .map(|item| decode_sequence(item.as_array().map(Vec::as_slice).unwrap_or(&[])))
                    .collect::<PipelineResult<Vec<_>>>()?;
                OutputValue::Batch(batch)
            }
            Value::Array(items) if is_frame_key && items.iter().all(Value::is_string) => {
                OutputValue::Frames(decode_sequence(&items)?)
            }
            other => OutputValue::Other(other),
        };
        output.insert(key, decoded);
    }

    Ok(output)
}

/// A pipeline instance living in the runtime.
pub struct RemotePipeline {
    client: Arc<RemoteClient>,
    id: String,
    class: PipelineClass,
    output_shape: Option<OutputShape>,
}

#[async_trait]
impl VideoPipeline for RemotePipeline {
    fn class(&self) -> PipelineClass {
        self.class
    }

    fn output_shape(&self) -> Option<OutputShape> {
        self.output_shape
    }

    async fn enable_attention_slicing(&self) -> PipelineResult<()> {
        self.client.set_option(&self.id, "attention_slicing").await
    }

    async fn enable_model_cpu_offload(&self) -> PipelineResult<()> {
        self.client.set_option(&self.id, "cpu_offload").await
    }

    async fn generate(&self, request: &GenerationRequest) -> PipelineResult<PipelineOutput> {
        self.client.generate(&self.id, request).await
    }
}

/// Loads pipelines in the runtime.
#[derive(Clone)]
pub struct RemoteBackend {
    client: Arc<RemoteClient>,
}

impl RemoteBackend {
    pub fn new(client: RemoteClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl PipelineBackend for RemoteBackend {
    async fn load(
        &self,
        class: PipelineClass,
        spec: &LoadSpec,
    ) -> PipelineResult<Arc<dyn VideoPipeline>> {
        let created = self.client.create_pipeline(class, spec).await?;
        let output_shape = created.output_key.as_deref().and_then(OutputShape::from_key);

        info!(
            pipeline_id = %created.pipeline_id,
            class = %class,
            dtype = %spec.precision,
            device = %spec.device,
            "Pipeline loaded"
        );

        Ok(Arc::new(RemotePipeline {
            client: self.client.clone(),
            id: created.pipeline_id,
            class,
            output_shape,
        }))
    }
}
