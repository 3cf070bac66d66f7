//! MP4 encoding of generated frames.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use ltx_models::EncodingConfig;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegInput, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Pads odd dimensions up to even, which yuv420p requires.
const EVEN_DIMENSIONS_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

/// A finished encode on local disk.
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub size_bytes: u64,
}

/// Convert decoded frames of any color type to packed RGB.
pub fn to_rgb_frames(frames: Vec<DynamicImage>) -> Vec<RgbImage> {
    frames
        .into_iter()
        .map(|frame| match frame {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        })
        .collect()
}

/// Check the sequence is non-empty and every frame matches the first frame's size.
pub fn check_frames(frames: &[RgbImage]) -> MediaResult<(u32, u32)> {
    let first = frames.first().ok_or(MediaError::EmptyFrames)?;
    let (width, height) = first.dimensions();

    for (index, frame) in frames.iter().enumerate().skip(1) {
        let (actual_width, actual_height) = frame.dimensions();
        if (actual_width, actual_height) != (width, height) {
            return Err(MediaError::FrameSizeMismatch {
                index,
                width,
                height,
                actual_width,
                actual_height,
            });
        }
    }

    Ok((width, height))
}

/// Writes a frame sequence to a video file.
#[async_trait]
pub trait FrameEncoder: Send + Sync {
    async fn encode_mp4(
        &self,
        frames: &[RgbImage],
        out_path: &Path,
        fps: u32,
    ) -> MediaResult<EncodedVideo>;
}

/// Encodes RGB frame sequences to H.264 MP4 via the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct VideoEncoder {
    config: EncodingConfig,
    timeout_secs: Option<u64>,
}

impl VideoEncoder {
    pub fn new(config: EncodingConfig) -> Self {
        Self {
            config,
            timeout_secs: None,
        }
    }

    /// Kill FFmpeg if encoding runs longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn config(&self) -> &EncodingConfig {
        &self.config
    }

    /// Build the FFmpeg command for a frame sequence.
    pub fn command(&self, width: u32, height: u32, fps: u32, out_path: &Path) -> FfmpegCommand {
        FfmpegCommand::with_input(FfmpegInput::rgb24(width, height, fps), out_path)
            .video_filter(EVEN_DIMENSIONS_FILTER)
            .output_args(self.config.to_ffmpeg_args())
            .frame_rate(fps)
            .faststart()
    }

    /// Write `frames` to an MP4 at `out_path`, creating parent directories.
    pub async fn encode(
        &self,
        frames: &[RgbImage],
        out_path: impl AsRef<Path>,
        fps: u32,
    ) -> MediaResult<EncodedVideo> {
        let out_path = out_path.as_ref();
        let (width, height) = check_frames(frames)?;
        if fps == 0 {
            return Err(MediaError::InvalidVideo("fps must be positive".to_string()));
        }

        if let Some(parent) = out_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let start = Instant::now();
        let cmd = self.command(width, height, fps, out_path);

        let mut runner = FfmpegRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }

        // Collected up front so no borrowing iterator lives across an await.
        let chunks: Vec<&[u8]> = frames.iter().map(|f| f.as_raw().as_slice()).collect();

        let total = frames.len() as u64;
        runner
            .run_with_frames(&cmd, &chunks, move |p| {
                debug!("Encoding {:.0}% ({} / {} frames)", p.percentage(total), p.frame, total)
            })
            .await?;

        let size_bytes = tokio::fs::metadata(out_path)
            .await
            .map_err(|_| MediaError::FileNotFound(out_path.to_path_buf()))?
            .len();

        info!(
            "Encoded {} frames ({}x{} @ {} fps) to {} in {:.2}s",
            frames.len(),
            width,
            height,
            fps,
            out_path.display(),
            start.elapsed().as_secs_f64()
        );

        Ok(EncodedVideo {
            path: out_path.to_path_buf(),
            frame_count: frames.len(),
            width,
            height,
            fps,
            size_bytes,
        })
    }
}

#[async_trait]
impl FrameEncoder for VideoEncoder {
    async fn encode_mp4(
        &self,
        frames: &[RgbImage],
        out_path: &Path,
        fps: u32,
    ) -> MediaResult<EncodedVideo> {
        self.encode(frames, out_path, fps).await
    }
}
