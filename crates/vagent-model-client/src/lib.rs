//! HTTP client for the external model service.
//!
//! One typed method per endpoint, per-operation timeouts, retry on
//! transient failures only. 4xx responses are permanent; 5xx and
//! network failures back off and retry.

pub mod client;
pub mod error;
pub mod types;

pub use client::{ModelClient, ModelClientConfig};
pub use error::{ModelError, ModelResult};
pub use types::{
    ClassificationRequest, EmbeddingKind, SynthesisKind, TranscriptionOptions, VisionResponse,
};
