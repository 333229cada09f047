//! Vector embeddings and their searchable payloads.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Dimensionality of every vector written to the index.
pub const EMBEDDING_DIM: usize = 1024;

/// Embedding-specific invariant violations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("expected {expected}-dimensional vector, got {actual}")]
    Dimension { expected: usize, actual: usize },
}

/// Enforce the 1024-D invariant on a vector about to be written.
pub fn ensure_embedding_dim(vector: &[f32]) -> Result<(), EmbeddingError> {
    if vector.len() != EMBEDDING_DIM {
        return Err(EmbeddingError::Dimension {
            expected: EMBEDDING_DIM,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// How frame embeddings are aggregated into a single vector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// Elementwise arithmetic mean
    #[default]
    Mean,
    /// Elementwise maximum
    Max,
    /// Confidence-weighted sum; uniform fallback when all weights are zero
    Attention,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Mean => "mean",
            AggregationMethod::Max => "max",
            AggregationMethod::Attention => "attention",
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            "attention" => Ok(Self::Attention),
            other => Err(format!("unknown aggregation method: {}", other)),
        }
    }
}

/// Searchable payload mirrored next to a video vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoPayload {
    /// Video (job) identifier
    pub video_id: String,
    /// Owner
    pub user_id: String,
    /// Duration in seconds
    pub duration_sec: f64,
    /// Scene type labels present in the video
    #[serde(default)]
    pub scene_types: Vec<String>,
    /// Classification tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Dominant color names
    #[serde(default)]
    pub dominant_colors: Vec<String>,
    /// Overall color profile label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_profile: Option<String>,
    /// SHA-256 of the aggregated vector's little-endian byte image
    pub content_hash: String,
    /// Creation instant (epoch ms)
    pub created_at_ms: i64,
}

/// Searchable payload mirrored next to a scene vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenePayload {
    /// Parent video (job) identifier
    pub video_id: String,
    /// Owner
    pub user_id: String,
    /// Scene ordinal within the video
    pub scene_ordinal: u32,
    /// First frame of the scene (inclusive)
    pub start_frame: u64,
    /// One past the last frame (exclusive)
    pub end_frame: u64,
    /// Scene duration in seconds
    pub duration_sec: f64,
    /// Scene type label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_type: Option<String>,
    /// Descriptor tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// SHA-256 of the aggregated vector's little-endian byte image
    pub content_hash: String,
    /// Creation instant (epoch ms)
    pub created_at_ms: i64,
}

/// A video-level embedding ready for upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoEmbedding {
    /// Point id (the video id)
    pub id: String,
    /// 1024-D vector
    pub vector: Vec<f32>,
    /// Searchable payload
    pub payload: VideoPayload,
}

impl VideoEmbedding {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, payload: VideoPayload) -> Self {
        Self {
            id: id.into(),
            vector,
            payload,
        }
    }
}

/// A scene-level embedding ready for upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneEmbedding {
    /// Point id (`<video-id>:<scene-ordinal>`)
    pub id: String,
    /// 1024-D vector
    pub vector: Vec<f32>,
    /// Searchable payload
    pub payload: ScenePayload,
}

impl SceneEmbedding {
    pub fn new(video_id: &str, scene_ordinal: u32, vector: Vec<f32>, payload: ScenePayload) -> Self {
        Self {
            id: format!("{}:{}", video_id, scene_ordinal),
            vector,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_check() {
        assert!(ensure_embedding_dim(&vec![0.0; EMBEDDING_DIM]).is_ok());
        assert!(ensure_embedding_dim(&vec![0.0; 512]).is_err());
        assert!(ensure_embedding_dim(&[]).is_err());
    }

    #[test]
    fn aggregation_parse() {
        assert_eq!(
            "attention".parse::<AggregationMethod>().unwrap(),
            AggregationMethod::Attention
        );
        assert!("median".parse::<AggregationMethod>().is_err());
    }

    #[test]
    fn scene_embedding_id() {
        let e = SceneEmbedding::new("v1", 3, vec![0.0; EMBEDDING_DIM], ScenePayload::default());
        assert_eq!(e.id, "v1:3");
    }
}
