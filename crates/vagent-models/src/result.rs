//! Final processing result and its constituents.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::audio::AudioAnalysis;
use crate::frame::Frame;
use crate::job::JobId;
use crate::scene::Scene;

/// Coarse quality bucket derived from resolution and bitrate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityBucket {
    Low,
    #[default]
    Sd,
    Hd,
    Uhd,
}

impl QualityBucket {
    /// Bucket by vertical resolution.
    pub fn from_height(height: u32) -> Self {
        match height {
            0..=359 => QualityBucket::Low,
            360..=719 => QualityBucket::Sd,
            720..=1439 => QualityBucket::Hd,
            _ => QualityBucket::Uhd,
        }
    }
}

/// Technical metadata extracted from the container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    /// Duration in seconds
    pub duration_sec: f64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: f64,
    /// Video codec name
    pub codec: String,
    /// Bitrate in kbit/s
    pub bitrate_kbps: u64,
    /// Audio codec name, if an audio track exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// Audio channel count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_channels: Option<u32>,
    /// Audio sample rate in Hz
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_sample_rate: Option<u32>,
    /// Quality bucket
    #[serde(default)]
    pub quality: QualityBucket,
}

/// Content classification result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContentClassification {
    /// Primary category label
    pub primary_category: String,
    /// Scored category labels, descending
    #[serde(default)]
    pub categories: Vec<ScoredLabel>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A label with a confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoredLabel {
    pub label: String,
    pub score: f32,
}

/// One model invocation, recorded for usage accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelUsage {
    /// Model identifier reported by the service
    pub model: String,
    /// Operation kind ("vision", "transcription", ...)
    pub operation: String,
    /// Input tokens, when reported
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens, when reported
    #[serde(default)]
    pub output_tokens: u64,
    /// Wall-clock time of the call in milliseconds
    pub elapsed_ms: u64,
}

/// Bundle produced for every terminally completed job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingResult {
    /// Owning job
    pub job_id: JobId,
    /// Container metadata
    pub metadata: VideoMetadata,
    /// Analyzed frames
    #[serde(default)]
    pub frames: Vec<Frame>,
    /// Audio analysis, absent when the audio stage was skipped or failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioAnalysis>,
    /// Detected scenes
    #[serde(default)]
    pub scenes: Vec<Scene>,
    /// Content classification, absent when disabled or failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<ContentClassification>,
    /// Content summary, absent when disabled or failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Total processing time in seconds
    pub elapsed_sec: f64,
    /// Model invocations made while processing
    #[serde(default)]
    pub model_usage: Vec<ModelUsage>,
    /// When the result was produced
    pub produced_at: DateTime<Utc>,
}

impl ProcessingResult {
    /// Empty result shell for a job; stages fill it in.
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            metadata: VideoMetadata::default(),
            frames: Vec::new(),
            audio: None,
            scenes: Vec::new(),
            classification: None,
            summary: None,
            elapsed_sec: 0.0,
            model_usage: Vec::new(),
            produced_at: Utc::now(),
        }
    }
}
