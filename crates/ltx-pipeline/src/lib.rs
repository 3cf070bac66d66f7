//! Diffusion pipeline access for video generation.
//!
//! Pipelines run in a separate inference runtime reached over HTTP. This
//! crate loads them once at startup (with class fallback), exposes them
//! behind the [`VideoPipeline`] trait, and locates frames in their output.

pub mod cache;
pub mod error;
pub mod generator;
pub mod loader;
pub mod pipeline;
pub mod remote;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use cache::{find_cached_model_path, resolve_model_source, DEFAULT_CACHE_DIR};
pub use error::{PipelineError, PipelineResult};
pub use generator::Generator;
pub use loader::{LoadedPipeline, PipelineSet};
pub use pipeline::{PipelineBackend, VideoPipeline};
pub use remote::{RemoteBackend, RemoteClient, RemoteConfig};
pub use types::{
    GenerationRequest, LoadSpec, OutputShape, OutputValue, PipelineClass, PipelineOutput,
    Precision,
};
