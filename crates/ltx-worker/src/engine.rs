//! Video generation engine: dispatch, encode, upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use ltx_media::{to_rgb_frames, FrameEncoder, ImageLoader, VideoEncoder};
use ltx_models::{EncodingConfig, JobId, JobInput, Mode, StorageResult, ValidatedJob};
use ltx_pipeline::{
    resolve_model_source, GenerationRequest, Generator, LoadedPipeline, PipelineBackend,
    PipelineSet,
};
use ltx_storage::{SupabaseClient, VideoUploader};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;

/// What a finished generation hands back to the handler.
#[derive(Debug, Clone)]
pub struct Generated {
    pub storage: StorageResult,
    pub meta: Map<String, Value>,
}

/// Holds the loaded pipelines and runs jobs against them.
pub struct LtxEngine {
    pipelines: PipelineSet,
    encoder: Arc<dyn FrameEncoder>,
    uploader: VideoUploader,
    images: ImageLoader,
    device: String,
    work_dir: PathBuf,
}

impl LtxEngine {
    pub fn new(
        pipelines: PipelineSet,
        encoder: Arc<dyn FrameEncoder>,
        uploader: VideoUploader,
        device: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> WorkerResult<Self> {
        Ok(Self {
            pipelines,
            encoder,
            uploader,
            images: ImageLoader::new()?,
            device: device.into(),
            work_dir: work_dir.into(),
        })
    }

    /// Load pipelines once and build the storage and encoding stack.
    pub async fn load(config: &WorkerConfig, backend: &dyn PipelineBackend) -> WorkerResult<Self> {
        let source = resolve_model_source(&config.model.cache_dir, &config.model.model_name);
        info!("Initializing engine with model: {}", config.model.model_name);

        let spec = config.model.load_spec(source);
        let pipelines = PipelineSet::load(backend, &spec).await?;

        let client = SupabaseClient::new(config.supabase.clone())?;
        let uploader = VideoUploader::new(client, config.upload.clone());
        let encoder = VideoEncoder::new(EncodingConfig::default())
            .with_timeout(config.encode_timeout_secs);

        Self::new(
            pipelines,
            Arc::new(encoder),
            uploader,
            config.model.device.clone(),
            config.work_dir.clone(),
        )
    }

    pub fn pipelines(&self) -> &PipelineSet {
        &self.pipelines
    }

    /// Generate, encode and upload one validated job.
    pub async fn generate(&self, job_id: &JobId, job: &ValidatedJob) -> WorkerResult<Generated> {
        job_id.validate()?;
        let input = &job.input;
        let logger = JobLogger::new(job_id, job.mode().as_str());

        let selected = self.select_pipeline(job.mode())?;
        let pipeline = &selected.pipeline;

        if input.low_vram {
            match pipeline.enable_model_cpu_offload().await {
                Ok(()) => logger.log_progress("low VRAM mode enabled (CPU offload)"),
                Err(e) => logger.log_warning(&format!("could not enable CPU offload: {}", e)),
            }
        }

        let image = match job.conditioning.image() {
            Some(source) => Some(self.images.load(source).await?),
            None => None,
        };

        let request = GenerationRequest {
            prompt: input.prompt.clone(),
            negative_prompt: input.negative_prompt.clone(),
            num_inference_steps: input.steps,
            guidance_scale: input.guidance,
            num_frames: input.num_frames,
            height: input.height,
            width: input.width,
            generator: Generator::for_seed(&self.device, input.generator_seed()),
            image,
        };

        logger.log_progress(&format!("running {}: {}", job.mode(), preview(&input.prompt)));
        let start = Instant::now();
        let output = pipeline.generate(&request).await?;
        let generation_secs = start.elapsed().as_secs_f64();
        metrics::record_generation_duration(job.mode().as_str(), generation_secs);
        logger.log_stage("generation", generation_secs);

        let (shape, frames) = output.into_frames_for(selected.shape)?;
        debug!(job_id = %job_id, key = shape.key(), frames = frames.len(), "Located pipeline output");
        let frames = to_rgb_frames(frames);

        let job_dir = self.work_dir.join(job_id.as_str());
        let stored = self
            .encode_and_upload(job_id, input, frames, &job_dir, &logger)
            .await;

        // Removed whether or not the upload went through.
        match tokio::fs::remove_dir_all(&job_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(job_id = %job_id, "Failed to clean up {}: {}", job_dir.display(), e),
        }
        let storage = stored?;

        let mut meta = Map::new();
        meta.insert("seed".into(), json!(input.seed));
        meta.insert("fps".into(), json!(input.fps));
        meta.insert("num_frames".into(), json!(input.num_frames));
        meta.insert("width".into(), json!(input.width));
        meta.insert("height".into(), json!(input.height));

        Ok(Generated { storage, meta })
    }

    async fn encode_and_upload(
        &self,
        job_id: &JobId,
        input: &JobInput,
        frames: Vec<RgbImage>,
        job_dir: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<StorageResult> {
        let file_name = input.file_name_or_default();
        let local_path = job_dir.join(file_name);

        let start = Instant::now();
        logger.log_progress(&format!("encoding video to {}", local_path.display()));
        let encoded = self
            .encoder
            .encode_mp4(&frames, &local_path, input.fps)
            .await?;
        metrics::record_encode_duration(start.elapsed().as_secs_f64());
        drop(frames);

        let start = Instant::now();
        let storage = self
            .uploader
            .upload_video(
                &encoded.path,
                job_id.as_str(),
                file_name,
                input.output_format,
                input.return_signed_url,
            )
            .await?;
        let upload_secs = start.elapsed().as_secs_f64();
        metrics::record_upload_duration(upload_secs);
        logger.log_stage("upload", upload_secs);

        Ok(storage)
    }

    fn select_pipeline(&self, mode: Mode) -> WorkerResult<&LoadedPipeline> {
        Ok(match mode {
            Mode::TextToVideo => self.pipelines.t2v(),
            Mode::ImageToVideo => self.pipelines.require_i2v()?,
        })
    }
}

/// First 50 characters of a prompt, for logs.
fn preview(prompt: &str) -> String {
    let mut chars = prompt.chars();
    let head: String = chars.by_ref().take(50).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
