//! Frame artifacts produced by the pipeline.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::rect::NormalizedRect;

/// Frame pixel data: either inline (small frames, live stream) or an
/// external blob handle written by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameData {
    /// Base64-encoded image bytes
    Inline { data_b64: String },
    /// Opaque blob-store handle
    Blob { handle: String },
}

/// An object detected in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedObject {
    /// Class label
    pub label: String,
    /// Detection confidence (0.0–1.0)
    pub confidence: f32,
    /// Bounding box normalised to [0,1]²
    pub bbox: NormalizedRect,
}

/// A text region detected in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextRegion {
    /// Recognised text
    pub text: String,
    /// Recognition confidence (0.0–1.0)
    pub confidence: f32,
    /// Bounding box normalised to [0,1]²
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<NormalizedRect>,
}

/// A single analyzed frame. Frames are append-only within a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Frame {
    /// Owning job
    pub job_id: JobId,
    /// Monotonic frame number within the job
    pub frame_number: u64,
    /// Presentation timestamp in seconds
    pub timestamp_sec: f64,
    /// Pixel data or blob handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<FrameData>,
    /// 1024-D feature vector, present once the frame is embedded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Model-derived description
    #[serde(default)]
    pub description: String,
    /// Detected objects
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    /// Detected text regions
    #[serde(default)]
    pub text_regions: Vec<TextRegion>,
    /// When the analysis was recorded
    pub analyzed_at: DateTime<Utc>,
}

impl Frame {
    /// Create a bare frame before analysis.
    pub fn new(job_id: JobId, frame_number: u64, timestamp_sec: f64) -> Self {
        Self {
            job_id,
            frame_number,
            timestamp_sec,
            data: None,
            embedding: None,
            description: String::new(),
            objects: Vec::new(),
            text_regions: Vec::new(),
            analyzed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_serde_roundtrip() {
        let mut frame = Frame::new(JobId::from_string("j1"), 7, 7.0);
        frame.description = "a dog".to_string();
        frame.objects.push(DetectedObject {
            label: "dog".to_string(),
            confidence: 0.92,
            bbox: NormalizedRect::new(0.1, 0.2, 0.3, 0.4),
        });

        let json = serde_json::to_string(&frame).unwrap();
        let decoded: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.frame_number, 7);
        assert_eq!(decoded.objects.len(), 1);
        assert_eq!(decoded.objects[0].label, "dog");
    }
}
