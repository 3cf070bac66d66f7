//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default pixel format, playable in browsers
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Default quality on the 0-10 scale (10 is best)
pub const DEFAULT_QUALITY: u8 = 8;
/// Highest value on the quality scale
pub const MAX_QUALITY: u8 = 10;

/// Encoding settings for generated clips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264", "mpeg4")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Quality on a 0-10 scale, mapped to CRF or qscale per codec
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Output pixel format
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_quality() -> u8 {
    DEFAULT_QUALITY
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            quality: DEFAULT_QUALITY,
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new config with updated quality (clamped to 0-10).
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(MAX_QUALITY);
        self
    }

    fn inverted_quality(&self) -> f64 {
        1.0 - f64::from(self.quality.min(MAX_QUALITY)) / f64::from(MAX_QUALITY)
    }

    /// CRF for x264 (0-51, lower is better).
    pub fn crf(&self) -> u8 {
        (self.inverted_quality() * 51.0) as u8
    }

    /// qscale for codecs without CRF (1-31, lower is better).
    pub fn qscale(&self) -> u8 {
        (self.inverted_quality() * 30.0) as u8 + 1
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.clone()];

        if self.codec == "libx264" {
            args.extend_from_slice(&["-crf".to_string(), self.crf().to_string()]);
        } else {
            args.extend_from_slice(&["-qscale:v".to_string(), self.qscale().to_string()]);
        }

        args.extend_from_slice(&["-pix_fmt".to_string(), self.pixel_format.clone()]);
        args.extend(self.extra_args.clone());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncodingConfig::default();
        assert_eq!(config.codec, "libx264");
        assert_eq!(config.quality, 8);
        assert_eq!(config.crf(), 10);
    }

    #[test]
    fn test_quality_bounds() {
        assert_eq!(EncodingConfig::new().with_quality(10).crf(), 0);
        assert_eq!(EncodingConfig::new().with_quality(0).crf(), 51);
        assert_eq!(EncodingConfig::new().with_quality(42).quality, 10);
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = EncodingConfig::default().to_ffmpeg_args();
        assert_eq!(
            args,
            vec!["-c:v", "libx264", "-crf", "10", "-pix_fmt", "yuv420p"]
        );
    }

    #[test]
    fn test_non_x264_uses_qscale() {
        let config = EncodingConfig {
            codec: "mpeg4".to_string(),
            ..Default::default()
        };
        let args = config.to_ffmpeg_args();
        assert!(args.contains(&"-qscale:v".to_string()));
        assert!(args.contains(&"6".to_string()));
    }
}
