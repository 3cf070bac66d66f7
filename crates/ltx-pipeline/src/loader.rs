//! Startup pipeline loading with class fallback.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{PipelineBackend, VideoPipeline};
use crate::types::{LoadSpec, OutputShape, PipelineClass};

/// A pipeline together with the output key it reported when loaded.
#[derive(Clone)]
pub struct LoadedPipeline {
    pub pipeline: Arc<dyn VideoPipeline>,
    pub shape: Option<OutputShape>,
}

impl LoadedPipeline {
    fn new(pipeline: Arc<dyn VideoPipeline>) -> Self {
        let shape = pipeline.output_shape();
        Self { pipeline, shape }
    }
}

/// The pipelines a worker holds for its lifetime.
#[derive(Clone)]
pub struct PipelineSet {
    t2v: LoadedPipeline,
    i2v: Option<LoadedPipeline>,
}

impl PipelineSet {
    fn new(t2v: Arc<dyn VideoPipeline>, i2v: Option<Arc<dyn VideoPipeline>>) -> Self {
        Self {
            t2v: LoadedPipeline::new(t2v),
            i2v: i2v.map(LoadedPipeline::new),
        }
    }

    /// Load both pipelines once.
    ///
    /// The text-to-video class falls back to the generic loader when missing.
    /// A missing image-to-video class leaves i2v unset. Attention slicing is
    /// best-effort. Each pipeline's output key is recorded here so jobs do
    /// not have to guess it.
    pub async fn load(backend: &dyn PipelineBackend, spec: &LoadSpec) -> PipelineResult<Self> {
        let start = Instant::now();

        info!("Loading {} from {}", PipelineClass::Ltx2, spec.source);
        let t2v = match backend.load(PipelineClass::Ltx2, spec).await {
            Ok(pipeline) => pipeline,
            Err(e) if e.is_unavailable() => {
                info!(
                    "{} not found, using {} from {}",
                    PipelineClass::Ltx2,
                    PipelineClass::Diffusion,
                    spec.source
                );
                backend.load(PipelineClass::Diffusion, spec).await?
            }
            Err(e) => return Err(e),
        };

        info!("Loading {} from {}", PipelineClass::Ltx2ImageToVideo, spec.source);
        let i2v = match backend.load(PipelineClass::Ltx2ImageToVideo, spec).await {
            Ok(pipeline) => Some(pipeline),
            Err(e) if e.is_unavailable() => {
                warn!(
                    "{} not available, i2v mode will be limited",
                    PipelineClass::Ltx2ImageToVideo
                );
                None
            }
            Err(e) => return Err(e),
        };

        match t2v.enable_attention_slicing().await {
            Ok(()) => info!("Attention slicing enabled"),
            Err(e) => warn!("Could not enable attention slicing: {}", e),
        }

        let set = Self::new(t2v, i2v);
        for loaded in std::iter::once(&set.t2v).chain(set.i2v.as_ref()) {
            let class = loaded.pipeline.class();
            match loaded.shape {
                Some(shape) => info!("{} returns frames under '{}'", class, shape.key()),
                None => info!("{} reported no output key; frame keys will be searched", class),
            }
        }

        info!("Pipelines loaded in {:.2}s", start.elapsed().as_secs_f64());
        Ok(set)
    }

    pub fn t2v(&self) -> &LoadedPipeline {
        &self.t2v
    }

    /// The image-to-video pipeline, or the error a request should fail with.
    pub fn require_i2v(&self) -> PipelineResult<&LoadedPipeline> {
        self.i2v.as_ref().ok_or(PipelineError::ImageToVideoUnavailable)
    }

    pub fn supports_i2v(&self) -> bool {
        self.i2v.is_some()
    }
}
