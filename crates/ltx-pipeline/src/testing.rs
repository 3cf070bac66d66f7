//! In-process pipelines for tests. Enabled by the `testing` feature.
//!
//! `FakePipeline` produces solid-color frames whose colors come from the
//! request's generator, so seeded calls are reproducible.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{PipelineBackend, VideoPipeline};
use crate::types::{
    GenerationRequest, LoadSpec, OutputShape, OutputValue, PipelineClass, PipelineOutput,
};

/// A pipeline that fabricates frames without a model.
pub struct FakePipeline {
    class: PipelineClass,
    shape: Option<OutputShape>,
    batched: bool,
    stray_frames: bool,
    options_supported: bool,
    attention_slicing: AtomicBool,
    cpu_offload: AtomicBool,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl FakePipeline {
    pub fn new(class: PipelineClass) -> Self {
        Self {
            class,
            shape: Some(OutputShape::Frames),
            batched: false,
            stray_frames: false,
            options_supported: true,
            attention_slicing: AtomicBool::new(false),
            cpu_offload: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Emit frames under `videos` as a batch.
    pub fn batched_videos(mut self) -> Self {
        self.shape = Some(OutputShape::Videos);
        self.batched = true;
        self
    }

    /// Also emit a one-frame preview under the key this pipeline does not
    /// report.
    pub fn with_stray_frames(mut self) -> Self {
        self.stray_frames = true;
        self
    }

    /// Emit no recognizable frame key.
    pub fn without_frames(mut self) -> Self {
        self.shape = None;
        self
    }

    /// Reject attention slicing and CPU offload.
    pub fn without_options(mut self) -> Self {
        self.options_supported = false;
        self
    }

    pub fn attention_slicing_enabled(&self) -> bool {
        self.attention_slicing.load(Ordering::SeqCst)
    }

    pub fn cpu_offload_enabled(&self) -> bool {
        self.cpu_offload.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }

    fn render(&self, request: &GenerationRequest) -> Vec<DynamicImage> {
        let seed = match &request.generator {
            Some(generator) => generator.seed,
            None => rand::rng().random(),
        };
        let mut rng = StdRng::seed_from_u64(seed);

        // Conditioned runs start from the image's top-left color.
        let mut color = match &request.image {
            Some(image) if image.width() > 0 && image.height() > 0 => image.get_pixel(0, 0).0,
            _ => [rng.random(), rng.random(), rng.random()],
        };

        (0..request.num_frames)
            .map(|_| {
                let frame = RgbImage::from_pixel(request.width, request.height, Rgb(color));
                color = [
                    color[0].wrapping_add(rng.random_range(0..8)),
                    color[1].wrapping_add(rng.random_range(0..8)),
                    color[2].wrapping_add(rng.random_range(0..8)),
                ];
                DynamicImage::ImageRgb8(frame)
            })
            .collect()
    }
}

#[async_trait]
impl VideoPipeline for FakePipeline {
    fn class(&self) -> PipelineClass {
        self.class
    }

    fn output_shape(&self) -> Option<OutputShape> {
        self.shape
    }

    async fn enable_attention_slicing(&self) -> PipelineResult<()> {
        if !self.options_supported {
            return Err(PipelineError::RequestFailed(
                "attention slicing not supported".to_string(),
            ));
        }
        self.attention_slicing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn enable_model_cpu_offload(&self) -> PipelineResult<()> {
        if !self.options_supported {
            return Err(PipelineError::RequestFailed(
                "cpu offload not supported".to_string(),
            ));
        }
        self.cpu_offload.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> PipelineResult<PipelineOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let frames = self.render(request);
        let mut output = PipelineOutput::new().with(
            "nsfw_content_detected",
            OutputValue::Other(serde_json::Value::Bool(false)),
        );

        let stray = OutputShape::SEARCH_ORDER
            .into_iter()
            .find(|key| Some(*key) != self.shape);
        if let (true, Some(stray)) = (self.stray_frames, stray) {
            let preview = frames.iter().take(1).cloned().collect();
            output.insert(stray.key(), OutputValue::Frames(preview));
        }

        Ok(match (self.shape, self.batched) {
            (Some(shape), true) => output.with(shape.key(), OutputValue::Batch(vec![frames])),
            (Some(shape), false) => output.with(shape.key(), OutputValue::Frames(frames)),
            (None, _) => output,
        })
    }
}

/// A backend serving fake pipelines, with per-class availability.
#[derive(Default)]
pub struct FakeBackend {
    unavailable: HashSet<PipelineClass>,
    failing: HashSet<PipelineClass>,
    pipelines: HashMap<PipelineClass, Arc<FakePipeline>>,
    loaded: Mutex<Vec<PipelineClass>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `class` as unavailable.
    pub fn without(mut self, class: PipelineClass) -> Self {
        self.unavailable.insert(class);
        self
    }

    /// Fail loading `class` with a non-availability error.
    pub fn failing(mut self, class: PipelineClass) -> Self {
        self.failing.insert(class);
        self
    }

    /// Serve a specific pipeline instance for its class.
    pub fn with_pipeline(mut self, pipeline: Arc<FakePipeline>) -> Self {
        self.pipelines.insert(pipeline.class(), pipeline);
        self
    }

    /// Classes successfully loaded, in order.
    pub fn loaded(&self) -> Vec<PipelineClass> {
        self.loaded.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PipelineBackend for FakeBackend {
    async fn load(
        &self,
        class: PipelineClass,
        _spec: &LoadSpec,
    ) -> PipelineResult<Arc<dyn VideoPipeline>> {
        if self.unavailable.contains(&class) {
            return Err(PipelineError::class_unavailable(class.as_str()));
        }
        if self.failing.contains(&class) {
            return Err(PipelineError::RequestFailed(format!("failed to load {}", class)));
        }

        if let Ok(mut loaded) = self.loaded.lock() {
            loaded.push(class);
        }

        let pipeline: Arc<dyn VideoPipeline> = match self.pipelines.get(&class) {
            Some(p) => p.clone(),
            None => Arc::new(FakePipeline::new(class)),
        };
        Ok(pipeline)
    }
}
