//! LTX-2 video generation worker.
//!
//! This crate provides:
//! - Job handling: validate, generate, encode, upload
//! - The RunPod serverless job loop
//! - A local HTTP API for development
//! - Structured job logging, metrics and output delivery backoff

pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod runpod;
pub mod serve;

pub use config::{ModelSettings, WorkerConfig};
pub use engine::{Generated, LtxEngine};
pub use error::{WorkerError, WorkerResult};
pub use handler::JobHandler;
pub use logging::JobLogger;
pub use runpod::{RunpodClient, RunpodConfig, RunpodJob, ServerlessWorker};
pub use serve::create_router;
