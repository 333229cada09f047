//! Shared data models for the VideoAgent backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, processing options and the job state machine
//! - Frame/scene/audio artifacts and the final processing result
//! - Event-bus message schemas (tagged unions, one per channel family)
//! - Live-stream frame records and progressive results
//! - Vector embeddings and their searchable payloads
//! - The shared vision-response parser used by every vision call-site

pub mod audio;
pub mod embedding;
pub mod event;
pub mod frame;
pub mod job;
pub mod options;
pub mod rect;
pub mod reference;
pub mod result;
pub mod scene;
pub mod stream;
pub mod vision;

// Re-export common types
pub use audio::{AudioAnalysis, SpeakerSegment};
pub use embedding::{
    ensure_embedding_dim, AggregationMethod, EmbeddingError, SceneEmbedding, ScenePayload,
    VideoEmbedding, VideoPayload, EMBEDDING_DIM,
};
pub use event::{BusMessage, PipelineStage, ResultStage, ResultTimings};
pub use frame::{DetectedObject, Frame, FrameData, TextRegion};
pub use job::{
    BackoffPolicy, EnqueueOptions, Job, JobError, JobId, JobOrigin, JobRequest, JobState,
    JobStatus, QueueMetrics, RetentionPolicy,
};
pub use options::{FrameSamplingMode, ProcessingOptions, QualityPreference};
pub use rect::NormalizedRect;
pub use reference::{validate_local_path, validate_reference, ReferenceValidation};
pub use result::{
    ContentClassification, ModelUsage, ProcessingResult, QualityBucket, VideoMetadata,
};
pub use scene::{Scene, SceneDescriptors, Shot};
pub use stream::{
    frame_stream_key, StreamRecord, StreamResult, FRAME_STREAM_PREFIX, STREAM_CONSUMER_GROUP,
};
pub use vision::{parse_vision_response, FrameAnalysis};
