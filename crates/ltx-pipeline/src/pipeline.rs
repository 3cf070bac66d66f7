//! Pipeline traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PipelineResult;
use crate::types::{GenerationRequest, LoadSpec, OutputShape, PipelineClass, PipelineOutput};

/// A loaded diffusion pipeline.
#[async_trait]
pub trait VideoPipeline: Send + Sync {
    /// Class this pipeline was loaded as.
    fn class(&self) -> PipelineClass;

    /// Output key reported at load time, if the runtime advertised one.
    fn output_shape(&self) -> Option<OutputShape>;

    /// Compute attention in slices to lower peak memory.
    async fn enable_attention_slicing(&self) -> PipelineResult<()>;

    /// Offload weights to host memory between sub-model calls.
    async fn enable_model_cpu_offload(&self) -> PipelineResult<()>;

    /// Run one generation. Never retried.
    async fn generate(&self, request: &GenerationRequest) -> PipelineResult<PipelineOutput>;
}

/// Something that can construct pipelines by class.
#[async_trait]
pub trait PipelineBackend: Send + Sync {
    /// Load `class`, returning [`PipelineError::ClassUnavailable`] when the
    /// backend does not provide it.
    ///
    /// [`PipelineError::ClassUnavailable`]: crate::PipelineError::ClassUnavailable
    async fn load(
        &self,
        class: PipelineClass,
        spec: &LoadSpec,
    ) -> PipelineResult<Arc<dyn VideoPipeline>>;
}
