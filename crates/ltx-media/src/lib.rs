//! FFmpeg-backed media handling for generated videos.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with raw frame input on stdin
//! - Progress parsing from `-progress pipe:2`
//! - MP4 encoding of RGB frame sequences
//! - Conditioning image loading from URLs or base64

pub mod command;
pub mod encode;
pub mod error;
pub mod image_source;
pub mod progress;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegInput, FfmpegRunner};
pub use encode::{check_frames, to_rgb_frames, EncodedVideo, FrameEncoder, VideoEncoder};
pub use error::{MediaError, MediaResult};
pub use image_source::{load_from_base64, ImageLoader, IMAGE_FETCH_TIMEOUT};
pub use progress::FfmpegProgress;
