//! LTX-2 worker binary.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ltx_models::JobId;
use ltx_pipeline::{RemoteBackend, RemoteClient};
use ltx_worker::metrics::init_metrics;
use ltx_worker::{
    create_router, JobHandler, LtxEngine, RunpodClient, RunpodConfig, ServerlessWorker,
    WorkerConfig,
};

/// Local job file picked up when no serverless endpoint is configured.
const TEST_INPUT_FILE: &str = "test_input.json";

#[derive(Debug, Parser)]
#[command(name = "ltx-worker", version, about = "LTX-2 video generation worker")]
struct Cli {
    /// Run a single job from inline JSON and exit
    #[arg(long)]
    test_input: Option<String>,

    /// Serve a local HTTP API instead of polling for jobs
    #[arg(long)]
    serve_api: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Job id for single-job runs
    #[arg(long, env = "RUNPOD_JOB_ID")]
    job_id: Option<String>,
}

enum RunMode {
    Single(Value),
    Serve(SocketAddr),
    Serverless(RunpodConfig),
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ltx_worker=info,tower_http=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Accept either a bare input object or the `{"input": {...}}` envelope.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("input").is_some_and(Value::is_object) => {
            map.remove("input").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn resolve_mode(cli: &Cli) -> Result<RunMode, String> {
    if cli.serve_api {
        let addr = format!("{}:{}", cli.host, cli.port)
            .parse()
            .map_err(|e| format!("invalid listen address: {}", e))?;
        return Ok(RunMode::Serve(addr));
    }

    if let Some(raw) = &cli.test_input {
        let value = serde_json::from_str(raw).map_err(|e| format!("invalid --test-input: {}", e))?;
        return Ok(RunMode::Single(unwrap_envelope(value)));
    }

    if let Some(config) = RunpodConfig::from_env() {
        return Ok(RunMode::Serverless(config));
    }

    if Path::new(TEST_INPUT_FILE).exists() {
        let raw = std::fs::read_to_string(TEST_INPUT_FILE)
            .map_err(|e| format!("failed to read {}: {}", TEST_INPUT_FILE, e))?;
        let value = serde_json::from_str(&raw)
            .map_err(|e| format!("invalid {}: {}", TEST_INPUT_FILE, e))?;
        info!("Running job from {}", TEST_INPUT_FILE);
        return Ok(RunMode::Single(unwrap_envelope(value)));
    }

    Err("no serverless endpoint configured; pass --test-input or --serve-api".to_string())
}

#[tokio::main]
async fn main() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    info!("Starting ltx-worker");

    let mode = match resolve_mode(&cli) {
        Ok(mode) => mode,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let config = match WorkerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Worker config: {:?}", config);

    let metrics_handle = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let backend = match RemoteClient::new(config.inference.clone()) {
        Ok(client) => RemoteBackend::new(client),
        Err(e) => {
            error!("Failed to create inference client: {}", e);
            std::process::exit(1);
        }
    };

    let engine = match LtxEngine::load(&config, &backend).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Failed to load pipelines: {}", e);
            std::process::exit(1);
        }
    };
    let handler = JobHandler::new(engine);

    match mode {
        RunMode::Single(input) => {
            let job_id = cli.job_id.map(JobId::from_string).unwrap_or_else(JobId::local);
            let output = handler.handle(&job_id, input).await;
            match serde_json::to_string_pretty(&output) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    error!("Failed to serialize output: {}", e);
                    std::process::exit(1);
                }
            }
        }
        RunMode::Serve(addr) => {
            let app = create_router(handler, metrics_handle);
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!("Failed to bind {}: {}", addr, e);
                    std::process::exit(1);
                }
            };
            info!("Serving local API on http://{}", addr);

            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                    info!("Received shutdown signal");
                })
                .await;
            if let Err(e) = served {
                error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        RunMode::Serverless(runpod) => {
            let client = match RunpodClient::new(runpod) {
                Ok(c) => c,
                Err(e) => {
                    error!("Failed to create job client: {}", e);
                    std::process::exit(1);
                }
            };
            let worker = ServerlessWorker::new(client, handler);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received shutdown signal");
                let _ = shutdown_tx.send(true);
            });

            if let Err(e) = worker.run(shutdown_rx).await {
                error!("Worker error: {}", e);
                std::process::exit(1);
            }
        }
    }

    info!("Worker shutdown complete");
}
