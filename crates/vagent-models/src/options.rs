//! Processing options carried by every job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How frames are sampled from the video.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum FrameSamplingMode {
    /// Decoder keyframes only
    Keyframes,
    /// Fixed rate across the whole video
    #[default]
    Uniform,
    /// Frames aligned to detected scenes (materialised at keyframes,
    /// trimmed after scene detection)
    SceneBased,
}

impl FrameSamplingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameSamplingMode::Keyframes => "keyframes",
            FrameSamplingMode::Uniform => "uniform",
            FrameSamplingMode::SceneBased => "scene-based",
        }
    }
}

impl fmt::Display for FrameSamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameSamplingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyframes" => Ok(Self::Keyframes),
            "uniform" => Ok(Self::Uniform),
            "scene-based" | "scene_based" => Ok(Self::SceneBased),
            other => Err(format!("unknown frame sampling mode: {}", other)),
        }
    }
}

/// Speed/accuracy trade-off requested by the caller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreference {
    Speed,
    #[default]
    Balanced,
    Accuracy,
}

/// Complete set of per-job processing options.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingOptions {
    /// Extract and analyze frames
    pub extract_frames: bool,
    /// Frame sampling strategy
    pub frame_sampling_mode: FrameSamplingMode,
    /// Frames per second for uniform sampling
    pub frame_sample_rate: f64,
    /// Upper bound on extracted frames (0 = unbounded)
    pub max_frames: u32,
    /// Extract the audio track
    pub extract_audio: bool,
    /// Transcribe extracted audio with diarization
    pub transcribe_audio: bool,
    /// Detect scene boundaries from frame embeddings
    pub detect_scenes: bool,
    /// Run object detection per frame
    pub detect_objects: bool,
    /// Run text detection per frame
    pub extract_text: bool,
    /// Classify the overall content
    pub classify_content: bool,
    /// Generate a content summary
    pub generate_summary: bool,
    /// Free-form analysis instructions forwarded to the vision model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_analysis: Option<String>,
    /// Preferred transcript languages
    pub target_languages: Vec<String>,
    /// Speed/accuracy trade-off
    pub quality_preference: QualityPreference,
    /// Caller-supplied metadata echoed into the result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            extract_frames: true,
            frame_sampling_mode: FrameSamplingMode::default(),
            frame_sample_rate: 1.0,
            max_frames: 0,
            extract_audio: true,
            transcribe_audio: true,
            detect_scenes: true,
            detect_objects: true,
            extract_text: true,
            classify_content: true,
            generate_summary: true,
            custom_analysis: None,
            target_languages: Vec::new(),
            quality_preference: QualityPreference::default(),
            additional_metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let opts = ProcessingOptions::default();
        assert!(opts.extract_frames);
        assert_eq!(opts.frame_sample_rate, 1.0);
        assert_eq!(opts.max_frames, 0);
        assert_eq!(opts.frame_sampling_mode, FrameSamplingMode::Uniform);
    }

    #[test]
    fn sampling_mode_roundtrip() {
        for mode in [
            FrameSamplingMode::Keyframes,
            FrameSamplingMode::Uniform,
            FrameSamplingMode::SceneBased,
        ] {
            let parsed: FrameSamplingMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn options_deserialize_with_partial_input() {
        let opts: ProcessingOptions =
            serde_json::from_str(r#"{"extractFrames": false, "maxFrames": 50}"#).unwrap();
        assert!(!opts.extract_frames);
        assert_eq!(opts.max_frames, 50);
        // Untouched fields keep defaults
        assert!(opts.extract_audio);
    }
}
