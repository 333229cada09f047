//! Job store contract.
//!
//! Persistent storage is an external collaborator; the orchestrator
//! hands artifacts over at stage completion through this trait. The
//! in-memory implementation backs tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use vagent_models::{AudioAnalysis, Frame, JobId, ProcessingResult, Scene, VideoMetadata};

use crate::error::WorkerResult;

/// External job store contract.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Record container metadata once extracted.
    async fn save_metadata(&self, job_id: &JobId, metadata: &VideoMetadata) -> WorkerResult<()>;

    /// Append analyzed frames for a job.
    async fn save_frames(&self, job_id: &JobId, frames: &[Frame]) -> WorkerResult<()>;

    /// Record the audio analysis.
    async fn save_audio(&self, job_id: &JobId, audio: &AudioAnalysis) -> WorkerResult<()>;

    /// Record detected scenes.
    async fn save_scenes(&self, job_id: &JobId, scenes: &[Scene]) -> WorkerResult<()>;

    /// Record the final processing result.
    async fn save_result(&self, result: &ProcessingResult) -> WorkerResult<()>;

    /// Discard everything written for a job (cancellation cleanup).
    async fn discard(&self, job_id: &JobId) -> WorkerResult<()>;
}

/// Fabric-backed store: artifacts live as TTL'd JSON documents until an
/// external store consumes them.
pub struct RedisJobStore {
    client: redis::Client,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisJobStore {
    pub fn new(redis_url: &str, key_prefix: impl Into<String>) -> WorkerResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| crate::error::WorkerError::store(e.to_string()))?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            ttl_secs: 86_400,
        })
    }

    fn key(&self, kind: &str, job_id: &JobId) -> String {
        format!("{}:store:{}:{}", self.key_prefix, kind, job_id)
    }

    async fn put<T: serde::Serialize>(&self, kind: &str, job_id: &JobId, value: &T) -> WorkerResult<()> {
        use redis::AsyncCommands;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| crate::error::WorkerError::store(e.to_string()))?;
        let payload = serde_json::to_string(value)
            .map_err(|e| crate::error::WorkerError::store(e.to_string()))?;
        conn.set_ex::<_, _, ()>(self.key(kind, job_id), payload, self.ttl_secs)
            .await
            .map_err(|e| crate::error::WorkerError::store(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn save_metadata(&self, job_id: &JobId, metadata: &VideoMetadata) -> WorkerResult<()> {
        self.put("metadata", job_id, metadata).await
    }

    async fn save_frames(&self, job_id: &JobId, frames: &[Frame]) -> WorkerResult<()> {
        self.put("frames", job_id, &frames).await
    }

    async fn save_audio(&self, job_id: &JobId, audio: &AudioAnalysis) -> WorkerResult<()> {
        self.put("audio", job_id, audio).await
    }

    async fn save_scenes(&self, job_id: &JobId, scenes: &[Scene]) -> WorkerResult<()> {
        self.put("scenes", job_id, &scenes).await
    }

    async fn save_result(&self, result: &ProcessingResult) -> WorkerResult<()> {
        self.put("result", &result.job_id, result).await
    }

    async fn discard(&self, job_id: &JobId) -> WorkerResult<()> {
        use redis::AsyncCommands;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| crate::error::WorkerError::store(e.to_string()))?;
        for kind in ["metadata", "frames", "audio", "scenes", "result"] {
            conn.del::<_, ()>(self.key(kind, job_id))
                .await
                .map_err(|e| crate::error::WorkerError::store(e.to_string()))?;
        }
        Ok(())
    }
}

/// In-memory store used by tests and local development.
#[derive(Default)]
pub struct InMemoryJobStore {
    results: Mutex<HashMap<String, ProcessingResult>>,
    frames: Mutex<HashMap<String, Vec<Frame>>>,
    scenes: Mutex<HashMap<String, Vec<Scene>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self, job_id: &JobId) -> Option<ProcessingResult> {
        self.results
            .lock()
            .expect("store mutex poisoned")
            .get(job_id.as_str())
            .cloned()
    }

    pub fn frame_count(&self, job_id: &JobId) -> usize {
        self.frames
            .lock()
            .expect("store mutex poisoned")
            .get(job_id.as_str())
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save_metadata(&self, _job_id: &JobId, _metadata: &VideoMetadata) -> WorkerResult<()> {
        Ok(())
    }

    async fn save_frames(&self, job_id: &JobId, frames: &[Frame]) -> WorkerResult<()> {
        self.frames
            .lock()
            .expect("store mutex poisoned")
            .entry(job_id.to_string())
            .or_default()
            .extend_from_slice(frames);
        Ok(())
    }

    async fn save_audio(&self, _job_id: &JobId, _audio: &AudioAnalysis) -> WorkerResult<()> {
        Ok(())
    }

    async fn save_scenes(&self, job_id: &JobId, scenes: &[Scene]) -> WorkerResult<()> {
        self.scenes
            .lock()
            .expect("store mutex poisoned")
            .insert(job_id.to_string(), scenes.to_vec());
        Ok(())
    }

    async fn save_result(&self, result: &ProcessingResult) -> WorkerResult<()> {
        self.results
            .lock()
            .expect("store mutex poisoned")
            .insert(result.job_id.to_string(), result.clone());
        Ok(())
    }

    async fn discard(&self, job_id: &JobId) -> WorkerResult<()> {
        self.results
            .lock()
            .expect("store mutex poisoned")
            .remove(job_id.as_str());
        self.frames
            .lock()
            .expect("store mutex poisoned")
            .remove(job_id.as_str());
        self.scenes
            .lock()
            .expect("store mutex poisoned")
            .remove(job_id.as_str());
        Ok(())
    }
}
