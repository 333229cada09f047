//! Scene and shot artifacts derived from frame embeddings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// A contiguous run of visually similar frames inside a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Shot {
    /// First frame of the shot (inclusive)
    pub start_frame: u64,
    /// One past the last frame of the shot (exclusive)
    pub end_frame: u64,
}

impl Shot {
    pub fn len(&self) -> u64 {
        self.end_frame.saturating_sub(self.start_frame)
    }

    pub fn is_empty(&self) -> bool {
        self.end_frame <= self.start_frame
    }
}

/// Aggregated descriptors attached to a scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneDescriptors {
    /// Visual keywords aggregated over the scene's frames
    #[serde(default)]
    pub visual: Vec<String>,
    /// Audio keywords covering the scene's time range
    #[serde(default)]
    pub audio: Vec<String>,
    /// Mean inter-frame motion score (0.0–1.0)
    #[serde(default)]
    pub motion: f32,
}

/// A contiguous run of shots sharing semantic context.
///
/// Scenes partition `[first_frame, last_frame]` into contiguous
/// non-overlapping `[start_frame, end_frame)` ranges; every frame
/// belongs to exactly one scene.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Owning job
    pub job_id: JobId,
    /// Zero-based scene index
    pub ordinal: u32,
    /// First frame of the scene (inclusive)
    pub start_frame: u64,
    /// One past the last frame of the scene (exclusive)
    pub end_frame: u64,
    /// Duration in seconds, derived from frame timestamps
    pub duration_sec: f64,
    /// 1024-D embedding aggregated over the scene's frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Aggregated descriptors
    #[serde(default)]
    pub descriptors: SceneDescriptors,
    /// Shots contained in the scene
    #[serde(default)]
    pub shots: Vec<Shot>,
}

impl Scene {
    /// Number of frames in the scene.
    pub fn frame_count(&self) -> u64 {
        self.end_frame.saturating_sub(self.start_frame)
    }

    /// Whether a frame number falls inside the scene.
    pub fn contains(&self, frame_number: u64) -> bool {
        frame_number >= self.start_frame && frame_number < self.end_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_containment() {
        let scene = Scene {
            job_id: JobId::from_string("j1"),
            ordinal: 0,
            start_frame: 60,
            end_frame: 120,
            duration_sec: 60.0,
            embedding: None,
            descriptors: SceneDescriptors::default(),
            shots: vec![],
        };
        assert!(scene.contains(60));
        assert!(scene.contains(119));
        assert!(!scene.contains(120));
        assert_eq!(scene.frame_count(), 60);
    }
}
