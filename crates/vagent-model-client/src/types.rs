//! Model service request/response types.

use serde::{Deserialize, Serialize};

/// Embedding flavor requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingKind {
    /// Stored content
    Document,
    /// Search query
    Query,
}

/// What kind of synthesis is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisKind {
    /// Content summary from frame descriptions + transcript
    Summary,
    /// Free-form custom analysis
    Custom,
}

/// Vision analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionRequest {
    /// Base64-encoded image
    pub image_b64: String,
    /// Analysis prompt
    pub prompt: String,
    /// Response token budget
    pub max_tokens: u32,
}

/// Vision analysis response. The content is a JSON-shaped string the
/// caller parses with the shared vision parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionResponse {
    /// Raw model output
    pub content: String,
    /// Model identifier
    #[serde(default)]
    pub model: String,
    /// Input tokens, when reported
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens, when reported
    #[serde(default)]
    pub output_tokens: u64,
}

/// Transcription request options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionOptions {
    /// Assign speaker labels
    #[serde(default = "default_true")]
    pub diarization: bool,
    /// Preferred languages (BCP 47), empty for auto-detect
    #[serde(default)]
    pub languages: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            diarization: true,
            languages: Vec::new(),
        }
    }
}

/// Transcription request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    /// Path to the extracted audio file, resolvable by the service
    pub audio_path: String,
    #[serde(flatten)]
    pub options: TranscriptionOptions,
}

/// Classification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRequest {
    /// Aggregated frame descriptions
    pub descriptions: Vec<String>,
    /// Transcript text, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// Synthesis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Source snippets (frame descriptions, metadata blurb, transcript)
    pub sources: Vec<String>,
    /// Synthesis kind
    pub kind: SynthesisKind,
}

/// Synthesis response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResponse {
    pub content: String,
}

/// Embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub text: String,
    pub kind: EmbeddingKind,
}

/// Embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub vector: Vec<f32>,
    #[serde(default)]
    pub model: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}
