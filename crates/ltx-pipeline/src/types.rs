//! Pipeline request/response types.

use std::collections::BTreeMap;
use std::fmt;

use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::generator::Generator;

/// Floating point precision for weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Float16,
    BFloat16,
}

impl Precision {
    /// `float16` selects half precision; any other value selects bfloat16.
    pub fn from_dtype(dtype: &str) -> Self {
        if dtype.trim() == "float16" {
            Precision::Float16
        } else {
            Precision::BFloat16
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Float16 => "float16",
            Precision::BFloat16 => "bfloat16",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline classes the loader knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineClass {
    /// Dedicated text-to-video class
    Ltx2,
    /// Generic loader used when the dedicated class is missing
    Diffusion,
    /// Image-conditioned class
    Ltx2ImageToVideo,
}

impl PipelineClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineClass::Ltx2 => "LTX2Pipeline",
            PipelineClass::Diffusion => "DiffusionPipeline",
            PipelineClass::Ltx2ImageToVideo => "LTX2ImageToVideoPipeline",
        }
    }
}

impl fmt::Display for PipelineClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how to load pipeline weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    /// Local snapshot path or hub model name
    pub source: String,
    pub precision: Precision,
    pub device: String,
}

/// Output key a pipeline stores its frames under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputShape {
    Frames,
    Videos,
}

impl OutputShape {
    /// Keys in the order they are searched.
    pub const SEARCH_ORDER: [OutputShape; 2] = [OutputShape::Frames, OutputShape::Videos];

    pub fn key(&self) -> &'static str {
        match self {
            OutputShape::Frames => "frames",
            OutputShape::Videos => "videos",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::SEARCH_ORDER.into_iter().find(|s| s.key() == key)
    }
}

/// Inputs for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub num_frames: u32,
    pub height: u32,
    pub width: u32,
    pub generator: Option<Generator>,
    /// Conditioning image for image-to-video pipelines
    pub image: Option<RgbImage>,
}

/// One value in a pipeline's output.
#[derive(Debug, Clone)]
pub enum OutputValue {
    /// A single frame sequence
    Frames(Vec<DynamicImage>),
    /// A batch of frame sequences
    Batch(Vec<Vec<DynamicImage>>),
    /// Anything else the runtime returned
    Other(serde_json::Value),
}

/// Raw pipeline output, keyed the way the runtime names its fields.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    entries: BTreeMap<String, OutputValue>,
}

impl PipelineOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: OutputValue) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: OutputValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Locate the frame sequence, reading the key a pipeline reported at
    /// load time first.
    ///
    /// Without a reported key, or when that key holds no frames, searches
    /// `frames` then `videos`. Batched output yields its first sequence.
    pub fn into_frames_for(
        mut self,
        reported: Option<OutputShape>,
    ) -> PipelineResult<(OutputShape, Vec<DynamicImage>)> {
        if let Some(shape) = reported {
            if let Some(frames) = self.take_frames(shape) {
                return Ok((shape, frames));
            }
        }

        for shape in OutputShape::SEARCH_ORDER {
            if let Some(frames) = self.take_frames(shape) {
                return Ok((shape, frames));
            }
        }

        Err(PipelineError::MissingOutput {
            available: self.keys(),
        })
    }

    fn take_frames(&mut self, shape: OutputShape) -> Option<Vec<DynamicImage>> {
        match self.entries.remove(shape.key())? {
            OutputValue::Frames(frames) => Some(frames),
            OutputValue::Batch(batch) => Some(batch.into_iter().next().unwrap_or_default()),
            other @ OutputValue::Other(_) => {
                self.entries.insert(shape.key().to_string(), other);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<DynamicImage> {
        (0..n).map(|_| DynamicImage::new_rgb8(2, 2)).collect()
    }

    #[test]
    fn test_precision_from_dtype() {
        assert_eq!(Precision::from_dtype("float16"), Precision::Float16);
        assert_eq!(Precision::from_dtype("bfloat16"), Precision::BFloat16);
        assert_eq!(Precision::from_dtype("fp32"), Precision::BFloat16);
    }

    #[test]
    fn test_frames_preferred_over_videos() {
        let output = PipelineOutput::new()
            .with("videos", OutputValue::Frames(frames(1)))
            .with("frames", OutputValue::Frames(frames(3)));

        let (shape, found) = output.into_frames_for(None).unwrap();
        assert_eq!(shape, OutputShape::Frames);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_videos_fallback_takes_first_batch() {
        let output =
            PipelineOutput::new().with("videos", OutputValue::Batch(vec![frames(4), frames(2)]));

        let (shape, found) = output.into_frames_for(None).unwrap();
        assert_eq!(shape, OutputShape::Videos);
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_non_frame_value_is_skipped() {
        let output = PipelineOutput::new()
            .with("frames", OutputValue::Other(serde_json::json!("latent")))
            .with("videos", OutputValue::Frames(frames(2)));

        let (shape, _) = output.into_frames_for(None).unwrap();
        assert_eq!(shape, OutputShape::Videos);
    }

    #[test]
    fn test_reported_key_wins_over_search_order() {
        let output = PipelineOutput::new()
            .with("frames", OutputValue::Frames(frames(1)))
            .with("videos", OutputValue::Batch(vec![frames(5)]));

        let (shape, found) = output.into_frames_for(Some(OutputShape::Videos)).unwrap();
        assert_eq!(shape, OutputShape::Videos);
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn test_reported_key_without_frames_falls_back() {
        let output = PipelineOutput::new()
            .with("videos", OutputValue::Other(serde_json::Value::Null))
            .with("frames", OutputValue::Frames(frames(2)));

        let (shape, found) = output.into_frames_for(Some(OutputShape::Videos)).unwrap();
        assert_eq!(shape, OutputShape::Frames);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_missing_output_lists_keys() {
        let output = PipelineOutput::new().with("latents", OutputValue::Other(serde_json::Value::Null));

        let err = output.into_frames_for(None).unwrap_err();
        assert!(matches!(err, PipelineError::MissingOutput { .. }));
        assert!(err.to_string().contains("latents"));
    }

    #[test]
    fn test_output_shape_keys() {
        assert_eq!(OutputShape::from_key("videos"), Some(OutputShape::Videos));
        assert_eq!(OutputShape::from_key("images"), None);
    }
}
