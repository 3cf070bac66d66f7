//! End-to-end job handling against an in-process pipeline and mocked storage.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ltx_media::{check_frames, EncodedVideo, FrameEncoder, MediaResult};
use ltx_models::JobId;
use ltx_pipeline::testing::{FakeBackend, FakePipeline};
use ltx_pipeline::{LoadSpec, PipelineClass, PipelineSet, Precision};
use ltx_storage::{SupabaseClient, SupabaseConfig, UploadOptions, VideoUploader};
use ltx_worker::retry::DeliveryPolicy;
use ltx_worker::{create_router, JobHandler, LtxEngine, RunpodClient, RunpodConfig, ServerlessWorker};

const BUCKET: &str = "ltx2-outputs";

/// Writes a placeholder file and remembers the first pixel and frame count
/// of each encode.
#[derive(Default)]
struct RecordingEncoder {
    first_pixels: Mutex<Vec<[u8; 3]>>,
    frame_counts: Mutex<Vec<usize>>,
}

impl RecordingEncoder {
    fn first_pixels(&self) -> Vec<[u8; 3]> {
        self.first_pixels.lock().unwrap().clone()
    }

    fn frame_counts(&self) -> Vec<usize> {
        self.frame_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl FrameEncoder for RecordingEncoder {
    async fn encode_mp4(
        &self,
        frames: &[RgbImage],
        out_path: &Path,
        fps: u32,
    ) -> MediaResult<EncodedVideo> {
        let (width, height) = check_frames(frames)?;
        self.first_pixels
            .lock()
            .unwrap()
            .push(frames[0].get_pixel(0, 0).0);
        self.frame_counts.lock().unwrap().push(frames.len());

        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(out_path, b"not really an mp4").await?;

        Ok(EncodedVideo {
            path: out_path.to_path_buf(),
            frame_count: frames.len(),
            width,
            height,
            fps,
            size_bytes: 17,
        })
    }
}

struct Harness {
    server: MockServer,
    handler: JobHandler,
    encoder: Arc<RecordingEncoder>,
    work_dir: tempfile::TempDir,
}

impl Harness {
    async fn new(backend: FakeBackend, options: UploadOptions) -> Self {
        let server = MockServer::start().await;
        let work_dir = tempfile::tempdir().unwrap();
        let encoder = Arc::new(RecordingEncoder::default());

        let spec = LoadSpec {
            source: "Lightricks/LTX-2".to_string(),
            precision: Precision::Float16,
            device: "cpu".to_string(),
        };
        let pipelines = PipelineSet::load(&backend, &spec).await.unwrap();

        let client =
            SupabaseClient::new(SupabaseConfig::new(server.uri(), "service-key", BUCKET)).unwrap();
        let uploader = VideoUploader::new(client, options);

        let engine = LtxEngine::new(
            pipelines,
            encoder.clone(),
            uploader,
            "cpu",
            work_dir.path(),
        )
        .unwrap();

        Self {
            server,
            handler: JobHandler::new(Arc::new(engine)),
            encoder,
            work_dir,
        }
    }

    async fn mock_upload(&self, expected: u64) {
        Mock::given(method("POST"))
            .and(path_regex(format!(
                r"^/storage/v1/object/{}/ltx2/\d{{4}}-\d{{2}}-\d{{2}}/[^/]+/[^/]+\.mp4$",
                BUCKET
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "ok" })))
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    async fn mock_sign(&self, expected: u64) {
        Mock::given(method("POST"))
            .and(path_regex(format!(r"^/storage/v1/object/sign/{}/", BUCKET)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "signedURL": "/object/sign/ltx2-outputs/v.mp4?token=abc" })),
            )
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    async fn run(&self, job_id: &str, input: Value) -> Value {
        self.handler
            .handle(&JobId::from_string(job_id), input)
            .await
            .to_value()
    }

    fn job_dir(&self, job_id: &str) -> PathBuf {
        self.work_dir.path().join(job_id)
    }
}

fn png_base64(color: [u8; 3]) -> String {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb(color)));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    base64::engine::general_purpose::STANDARD.encode(bytes.into_inner())
}

fn small_job(prompt: &str) -> Value {
    json!({
        "prompt": prompt,
        "num_frames": 4,
        "height": 64,
        "width": 64,
        "seed": 42
    })
}

#[tokio::test]
async fn test_t2v_job_returns_signed_url() {
    let harness = Harness::new(FakeBackend::new(), UploadOptions::default()).await;
    harness.mock_upload(1).await;
    harness.mock_sign(1).await;

    let output = harness.run("job-t2v", small_job("a red fox in the snow")).await;

    assert_eq!(output["ok"], true);
    assert_eq!(output["mode"], "t2v");

    let supabase = &output["supabase"];
    assert_eq!(supabase["bucket"], BUCKET);
    let key = supabase["path"].as_str().unwrap();
    assert!(key.starts_with("ltx2/"));
    assert!(key.ends_with("/job-t2v/video.mp4"));

    let signed = supabase["signed_url"].as_str().unwrap();
    assert_eq!(
        signed,
        format!("{}/storage/v1/object/sign/ltx2-outputs/v.mp4?token=abc", harness.server.uri())
    );
    assert_eq!(supabase["public_url"], Value::Null);

    let meta = &output["meta"];
    assert_eq!(meta["seed"], 42);
    assert_eq!(meta["fps"], 24);
    assert_eq!(meta["num_frames"], 4);
    assert_eq!(meta["width"], 64);
    assert_eq!(meta["height"], 64);
    assert!(meta["inference_seconds"].as_f64().unwrap() >= 0.0);

    assert!(!harness.job_dir("job-t2v").exists());
}

#[tokio::test]
async fn test_public_bucket_skips_signing() {
    let options = UploadOptions {
        public: true,
        ..UploadOptions::default()
    };
    let harness = Harness::new(FakeBackend::new(), options).await;
    harness.mock_upload(1).await;
    harness.mock_sign(0).await;

    let mut input = small_job("lighthouse at dusk");
    input["file_name"] = json!("clip.mp4");
    let output = harness.run("job-public", input).await;

    assert_eq!(output["ok"], true);
    let public = output["supabase"]["public_url"].as_str().unwrap();
    assert!(public.starts_with(&format!(
        "{}/storage/v1/object/public/ltx2-outputs/ltx2/",
        harness.server.uri()
    )));
    assert!(public.ends_with("/job-public/clip.mp4"));
    assert_eq!(output["supabase"]["signed_url"], Value::Null);
}

#[tokio::test]
async fn test_private_bucket_without_signed_url() {
    let harness = Harness::new(FakeBackend::new(), UploadOptions::default()).await;
    harness.mock_upload(1).await;
    harness.mock_sign(0).await;

    let mut input = small_job("waves");
    input["return_signed_url"] = json!(false);
    let output = harness.run("job-nourl", input).await;

    assert_eq!(output["ok"], true);
    assert_eq!(output["supabase"]["signed_url"], Value::Null);
    assert_eq!(output["supabase"]["public_url"], Value::Null);
    assert!(output["supabase"]["path"].as_str().is_some());
}

#[tokio::test]
async fn test_i2v_job_conditions_on_image() {
    let i2v = Arc::new(FakePipeline::new(PipelineClass::Ltx2ImageToVideo));
    let backend = FakeBackend::new().with_pipeline(i2v.clone());
    let harness = Harness::new(backend, UploadOptions::default()).await;
    harness.mock_upload(1).await;
    harness.mock_sign(1).await;

    let mut input = small_job("the cat starts to dance");
    input["mode"] = json!("i2v");
    input["image_base64"] = json!(png_base64([10, 200, 30]));
    let output = harness.run("job-i2v", input).await;

    assert_eq!(output["ok"], true, "{}", output);
    assert_eq!(output["mode"], "i2v");
    assert_eq!(i2v.calls(), 1);

    let request = i2v.last_request().unwrap();
    let image = request.image.unwrap();
    assert_eq!(image.get_pixel(0, 0).0, [10, 200, 30]);
    assert_eq!(harness.encoder.first_pixels(), vec![[10, 200, 30]]);
}

#[tokio::test]
async fn test_i2v_without_image_pipeline_fails() {
    let backend = FakeBackend::new().without(PipelineClass::Ltx2ImageToVideo);
    let harness = Harness::new(backend, UploadOptions::default()).await;
    harness.mock_upload(0).await;

    let mut input = small_job("a dancing cat");
    input["mode"] = json!("i2v");
    input["image_base64"] = json!(png_base64([0, 0, 0]));
    let output = harness.run("job-no-i2v", input).await;

    assert_eq!(output["ok"], false);
    let error = output["error"].as_str().unwrap();
    assert!(error.contains("LTX2ImageToVideoPipeline is not available"));
}

#[tokio::test]
async fn test_invalid_input_reported() {
    let harness = Harness::new(FakeBackend::new(), UploadOptions::default()).await;
    harness.mock_upload(0).await;

    let output = harness.run("job-bad", json!({ "mode": "t2v" })).await;
    assert_eq!(output["ok"], false);
    let error = output["error"].as_str().unwrap();
    assert!(error.starts_with("Invalid input:"));
    assert!(error.contains("prompt"));

    let output = harness
        .run("job-bad", json!({ "prompt": "x", "mode": "i2v" }))
        .await;
    assert_eq!(output["ok"], false);
    assert_eq!(
        output["error"],
        "Invalid input: i2v mode requires either image_url or image_base64"
    );
}

#[tokio::test]
async fn test_malformed_base64_image_fails() {
    let harness = Harness::new(FakeBackend::new(), UploadOptions::default()).await;
    harness.mock_upload(0).await;

    let mut input = small_job("broken image");
    input["mode"] = json!("i2v");
    input["image_base64"] = json!("data:image/png;base64,!!!not-base64!!!");
    let output = harness.run("job-b64", input).await;

    assert_eq!(output["ok"], false);
    assert!(output["error"].as_str().is_some());
}

#[tokio::test]
async fn test_missing_output_key_fails() {
    let t2v = Arc::new(FakePipeline::new(PipelineClass::Ltx2).without_frames());
    let backend = FakeBackend::new().with_pipeline(t2v);
    let harness = Harness::new(backend, UploadOptions::default()).await;
    harness.mock_upload(0).await;

    let output = harness.run("job-empty", small_job("nothing")).await;

    assert_eq!(output["ok"], false);
    let error = output["error"].as_str().unwrap();
    assert!(error.contains("Could not find frames/videos"));
    assert!(error.contains("nsfw_content_detected"));
}

#[tokio::test]
async fn test_batched_videos_output_is_accepted() {
    let t2v = Arc::new(FakePipeline::new(PipelineClass::Ltx2).batched_videos());
    let backend = FakeBackend::new().with_pipeline(t2v);
    let harness = Harness::new(backend, UploadOptions::default()).await;
    harness.mock_upload(1).await;
    harness.mock_sign(1).await;

    let output = harness.run("job-batch", small_job("batched")).await;
    assert_eq!(output["ok"], true, "{}", output);
}

#[tokio::test]
async fn test_load_time_output_key_is_read_first() {
    // Reports `videos`, but also returns a one-frame preview under `frames`.
    let t2v = Arc::new(
        FakePipeline::new(PipelineClass::Ltx2)
            .batched_videos()
            .with_stray_frames(),
    );
    let backend = FakeBackend::new().with_pipeline(t2v);
    let harness = Harness::new(backend, UploadOptions::default()).await;
    harness.mock_upload(1).await;
    harness.mock_sign(1).await;

    let output = harness.run("job-shape", small_job("two keys")).await;

    assert_eq!(output["ok"], true, "{}", output);
    assert_eq!(harness.encoder.frame_counts(), vec![4]);
}

#[tokio::test]
async fn test_unsafe_job_ids_never_touch_the_filesystem() {
    let harness = Harness::new(FakeBackend::new(), UploadOptions::default()).await;
    harness.mock_upload(0).await;
    harness.mock_sign(0).await;

    let outside = tempfile::tempdir().unwrap();
    let planted = outside.path().join("planted");
    let absolute = planted.to_string_lossy().to_string();

    for job_id in [absolute.as_str(), "../escape", "a/b", ""] {
        let output = harness.run(job_id, small_job("nowhere")).await;
        assert_eq!(output["ok"], false, "{job_id}");
        let error = output["error"].as_str().unwrap();
        assert!(error.starts_with("Invalid input: job_id"), "{error}");
    }

    assert!(!planted.exists());
    assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
    assert!(!harness.work_dir.path().parent().unwrap().join("escape").exists());
    assert!(harness.encoder.frame_counts().is_empty());
}

#[tokio::test]
async fn test_negative_seed_accepted() {
    let t2v = Arc::new(FakePipeline::new(PipelineClass::Ltx2));
    let backend = FakeBackend::new().with_pipeline(t2v.clone());
    let harness = Harness::new(backend, UploadOptions::default()).await;
    harness.mock_upload(1).await;
    harness.mock_sign(1).await;

    let mut input = small_job("any seed");
    input["seed"] = json!(-1);
    let output = harness.run("job-neg-seed", input).await;

    assert_eq!(output["ok"], true, "{}", output);
    assert_eq!(output["meta"]["seed"], -1);
    let generator = t2v.last_request().unwrap().generator.unwrap();
    assert_eq!(generator.seed, u64::MAX);
}

#[tokio::test]
async fn test_seeded_jobs_are_reproducible() {
    let harness = Harness::new(FakeBackend::new(), UploadOptions::default()).await;
    harness.mock_upload(3).await;
    harness.mock_sign(3).await;

    let mut other_seed = small_job("same prompt");
    other_seed["seed"] = json!(43);

    harness.run("job-a", small_job("same prompt")).await;
    harness.run("job-b", small_job("same prompt")).await;
    harness.run("job-c", other_seed).await;

    let pixels = harness.encoder.first_pixels();
    assert_eq!(pixels.len(), 3);
    assert_eq!(pixels[0], pixels[1]);
    assert_ne!(pixels[0], pixels[2]);
}

#[tokio::test]
async fn test_low_vram_enables_cpu_offload() {
    let t2v = Arc::new(FakePipeline::new(PipelineClass::Ltx2));
    let backend = FakeBackend::new().with_pipeline(t2v.clone());
    let harness = Harness::new(backend, UploadOptions::default()).await;
    harness.mock_upload(1).await;
    harness.mock_sign(1).await;

    assert!(t2v.attention_slicing_enabled());
    assert!(!t2v.cpu_offload_enabled());

    let mut input = small_job("low memory");
    input["low_vram"] = json!(true);
    let output = harness.run("job-lowvram", input).await;

    assert_eq!(output["ok"], true);
    assert!(t2v.cpu_offload_enabled());
}

#[tokio::test]
async fn test_offload_failure_is_not_fatal() {
    let t2v = Arc::new(FakePipeline::new(PipelineClass::Ltx2).without_options());
    let backend = FakeBackend::new().with_pipeline(t2v);
    let harness = Harness::new(backend, UploadOptions::default()).await;
    harness.mock_upload(1).await;
    harness.mock_sign(1).await;

    let mut input = small_job("still works");
    input["low_vram"] = json!(true);
    let output = harness.run("job-nooffload", input).await;

    assert_eq!(output["ok"], true);
}

#[tokio::test]
async fn test_upload_failure_reported() {
    let harness = Harness::new(FakeBackend::new(), UploadOptions::default()).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&harness.server)
        .await;

    let output = harness.run("job-403", small_job("denied")).await;
    assert_eq!(output["ok"], false);
    assert!(output["error"].as_str().unwrap().contains("403"));
    assert_eq!(harness.encoder.frame_counts(), vec![4]);
    assert!(!harness.job_dir("job-403").exists());
}

#[tokio::test]
async fn test_runsync_route() {
    let harness = Harness::new(FakeBackend::new(), UploadOptions::default()).await;
    harness.mock_upload(1).await;
    harness.mock_sign(1).await;

    let app = create_router(harness.handler.clone(), None);
    let body = json!({ "id": "local-1", "input": small_job("served") });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/runsync")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["id"], "local-1");
    assert_eq!(value["status"], "COMPLETED");
    assert_eq!(value["output"]["ok"], true);
}

#[tokio::test]
async fn test_health_route_reports_i2v_support() {
    let backend = FakeBackend::new().without(PipelineClass::Ltx2ImageToVideo);
    let harness = Harness::new(backend, UploadOptions::default()).await;

    let app = create_router(harness.handler.clone(), None);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["supports_i2v"], false);
}

#[tokio::test]
async fn test_serverless_poll_delivers_output() {
    let harness = Harness::new(FakeBackend::new(), UploadOptions::default()).await;
    harness.mock_upload(1).await;
    harness.mock_sign(1).await;

    let platform = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/job-take/pod-7"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "rp-1", "input": small_job("from the queue") })),
        )
        .mount(&platform)
        .await;
    Mock::given(method("POST"))
        .and(path("/job-done/pod-7/rp-1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&platform)
        .await;
    Mock::given(method("POST"))
        .and(path("/job-done/pod-7/rp-1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&platform)
        .await;

    let config = RunpodConfig {
        get_job_url: format!("{}/job-take/$ID", platform.uri()),
        post_output_url: format!("{}/job-done/pod-7/$ID", platform.uri()),
        api_key: None,
        pod_id: "pod-7".to_string(),
        idle_delay: Duration::from_millis(10),
        error_delay: Duration::from_millis(10),
    };
    let worker = ServerlessWorker::new(RunpodClient::new(config).unwrap(), harness.handler.clone())
        .with_delivery_policy(DeliveryPolicy::new(3, Duration::from_millis(1)));

    assert!(worker.poll_once().await.unwrap());

    let posts: Vec<_> = platform
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method == wiremock::http::Method::Post)
        .collect();
    assert_eq!(posts.len(), 2);

    let body: Value = serde_json::from_slice(&posts[1].body).unwrap();
    assert_eq!(body["output"]["ok"], true);
    assert_eq!(body["output"]["mode"], "t2v");
}

#[tokio::test]
async fn test_serverless_loop_stops_on_shutdown() {
    let harness = Harness::new(FakeBackend::new(), UploadOptions::default()).await;
    let platform = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&platform)
        .await;

    let config = RunpodConfig {
        get_job_url: format!("{}/job-take/$ID", platform.uri()),
        post_output_url: format!("{}/job-done/$ID", platform.uri()),
        api_key: None,
        pod_id: "pod-8".to_string(),
        idle_delay: Duration::from_millis(20),
        error_delay: Duration::from_millis(20),
    };
    let worker = ServerlessWorker::new(RunpodClient::new(config).unwrap(), harness.handler.clone());

    let (tx, rx) = tokio::sync::watch::channel(false);
    let run = tokio::spawn(async move { worker.run(rx).await });

    tokio::time::sleep(Duration::from_millis(60)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
