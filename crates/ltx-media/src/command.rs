//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Raw packed frames streamed to FFmpeg on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegInput {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: String,
}

impl FfmpegInput {
    /// Packed RGB frames.
    pub fn rgb24(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            pixel_format: "rgb24".to_string(),
        }
    }

    fn to_args(&self) -> Vec<String> {
        vec![
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            "-s".to_string(),
            format!("{}x{}", self.width, self.height),
            "-r".to_string(),
            self.fps.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
        ]
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: FfmpegInput,
    output: PathBuf,
    /// Output arguments (after the input)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn with_input(input: FfmpegInput, output: impl AsRef<Path>) -> Self {
        Self {
            input,
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    /// Add one output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set output frame rate.
    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// Move the moov atom to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            // Progress output to stderr
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-nostats".to_string(),
        ];

        args.extend(self.input.to_args());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Runs FFmpeg with frames on stdin, progress tracking and an optional timeout.
#[derive(Debug, Default)]
pub struct FfmpegRunner {
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill FFmpeg when writing frames and encoding take longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run `cmd`, streaming `frames` into FFmpeg's stdin in order.
    pub async fn run_with_frames<F>(
        &self,
        cmd: &FfmpegCommand,
        frames: &[&[u8]],
        progress_callback: F,
    ) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        let ffmpeg = check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stdin not captured", None, None))?;
        let mut reader = BufReader::new(stderr).lines();

        // Drain stderr concurrently so FFmpeg never blocks on a full pipe.
        let stderr_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                if FfmpegProgress::is_progress_line(&line) {
                    if let Some(progress) = current.apply_line(&line) {
                        progress_callback(progress);
                    }
                } else if !line.trim().is_empty() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }

            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let work = async {
            let written = write_frames(stdin, frames).await;
            let status = child.wait().await;
            (written, status)
        };

        let (written, status) = match self.timeout_secs {
            Some(secs) => {
                let timed = tokio::time::timeout(Duration::from_secs(secs), work).await;
                match timed {
                    Ok(done) => done,
                    Err(_) => {
                        warn!("FFmpeg timed out after {} seconds, killing process", secs);
                        let _ = child.kill().await;
                        stderr_handle.abort();
                        return Err(MediaError::Timeout(secs));
                    }
                }
            }
            None => work.await,
        };

        let status = status?;
        let stderr_tail = non_empty(stderr_handle.await.unwrap_or_default());

        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                stderr_tail,
                status.code(),
            ));
        }

        // FFmpeg exited cleanly but stopped reading early.
        written.map_err(|e| {
            MediaError::ffmpeg_failed(format!("failed writing frames: {}", e), stderr_tail, None)
        })
    }
}

async fn write_frames(mut stdin: ChildStdin, frames: &[&[u8]]) -> std::io::Result<()> {
    for frame in frames {
        stdin.write_all(frame).await?;
    }
    stdin.flush().await?;
    // Dropping stdin sends EOF.
    drop(stdin);
    Ok(())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}
