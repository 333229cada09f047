//! Event-bus message schemas.
//!
//! Every channel family on the bus carries one variant of the
//! [`BusMessage`] tagged union, discriminated by `type`. Payloads are
//! fully typed; there are no free-form maps on the wire.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobState};
use crate::stream::StreamResult;

/// Pipeline stages in execution order, with their progress anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Prepare,
    Validate,
    Metadata,
    Frames,
    Audio,
    Scenes,
    Classify,
    Summarize,
    Persist,
    Complete,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Prepare => "prepare",
            PipelineStage::Validate => "validate",
            PipelineStage::Metadata => "metadata",
            PipelineStage::Frames => "frames",
            PipelineStage::Audio => "audio",
            PipelineStage::Scenes => "scenes",
            PipelineStage::Classify => "classify",
            PipelineStage::Summarize => "summarize",
            PipelineStage::Persist => "persist",
            PipelineStage::Complete => "complete",
        }
    }

    /// Progress value published when the stage completes.
    pub fn progress_anchor(&self) -> u8 {
        match self {
            PipelineStage::Prepare => 10,
            PipelineStage::Validate => 15,
            PipelineStage::Metadata => 25,
            PipelineStage::Frames => 60,
            PipelineStage::Audio => 75,
            PipelineStage::Scenes => 85,
            PipelineStage::Classify => 90,
            PipelineStage::Summarize => 95,
            PipelineStage::Persist => 100,
            PipelineStage::Complete => 100,
        }
    }

    /// All stages in execution order.
    pub fn ordered() -> [PipelineStage; 9] {
        [
            PipelineStage::Prepare,
            PipelineStage::Validate,
            PipelineStage::Metadata,
            PipelineStage::Frames,
            PipelineStage::Audio,
            PipelineStage::Scenes,
            PipelineStage::Classify,
            PipelineStage::Summarize,
            PipelineStage::Persist,
        ]
    }
}

/// Tier of a progressive result emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultStage {
    Partial,
    Refined,
    Final,
}

impl ResultStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStage::Partial => "partial",
            ResultStage::Refined => "refined",
            ResultStage::Final => "final",
        }
    }

    /// Confidence attached to this tier.
    pub fn confidence(&self) -> f32 {
        match self {
            ResultStage::Partial => 0.60,
            ResultStage::Refined => 0.85,
            ResultStage::Final => 0.95,
        }
    }

    /// Bus topic for this tier.
    pub fn topic(&self) -> &'static str {
        match self {
            ResultStage::Partial => "results:partial",
            ResultStage::Refined => "results:refined",
            ResultStage::Final => "results:final",
        }
    }
}

/// Timing breakdown attached to refined/final emissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResultTimings {
    /// When the base result was created (epoch ms)
    pub created_at_ms: i64,
    /// Partial emission instant (epoch ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_ms: Option<i64>,
    /// Refined emission instant (epoch ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_ms: Option<i64>,
    /// Final emission instant (epoch ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_ms: Option<i64>,
    /// Milliseconds between partial and refined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_time_ms: Option<i64>,
    /// Milliseconds between creation and final
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time_ms: Option<i64>,
}

/// Message envelope carried on every bus topic.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
    /// Job lifecycle transition, published to `jobs` and `jobs:<id>`
    JobEvent {
        job_id: JobId,
        state: JobState,
        progress: u8,
        attempts_made: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Stage progress, published to `progress:<id>`
    ProgressUpdate {
        job_id: JobId,
        progress: u8,
        stage: PipelineStage,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Per-frame analysis notification, published to `frames:<id>`
    FrameEvent {
        job_id: JobId,
        frame_number: u64,
        description: String,
        timestamp: DateTime<Utc>,
    },

    /// Scene detection notification, published to `scenes:<id>`
    SceneEvent {
        job_id: JobId,
        ordinal: u32,
        start_frame: u64,
        end_frame: u64,
        timestamp: DateTime<Utc>,
    },

    /// Progressive live-stream result, published to `results:{partial|refined|final}`
    ProgressiveResult {
        stream_id: String,
        frame_number: u64,
        stage: ResultStage,
        confidence: f32,
        result: StreamResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timings: Option<ResultTimings>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enriched: Option<serde_json::Value>,
        timestamp: DateTime<Utc>,
    },
}

impl BusMessage {
    /// Create a job lifecycle event.
    pub fn job_event(job_id: JobId, state: JobState, progress: u8, attempts_made: u32) -> Self {
        BusMessage::JobEvent {
            job_id,
            state,
            progress,
            attempts_made,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a job lifecycle event carrying an error string.
    pub fn job_event_with_error(
        job_id: JobId,
        state: JobState,
        progress: u8,
        attempts_made: u32,
        error: impl Into<String>,
    ) -> Self {
        BusMessage::JobEvent {
            job_id,
            state,
            progress,
            attempts_made,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    /// Create a stage progress update.
    pub fn progress_update(
        job_id: JobId,
        stage: PipelineStage,
        message: impl Into<String>,
    ) -> Self {
        BusMessage::ProgressUpdate {
            job_id,
            progress: stage.progress_anchor(),
            stage,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a frame notification.
    pub fn frame_event(job_id: JobId, frame_number: u64, description: impl Into<String>) -> Self {
        BusMessage::FrameEvent {
            job_id,
            frame_number,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a scene notification.
    pub fn scene_event(job_id: JobId, ordinal: u32, start_frame: u64, end_frame: u64) -> Self {
        BusMessage::SceneEvent {
            job_id,
            ordinal,
            start_frame,
            end_frame,
            timestamp: Utc::now(),
        }
    }

    /// Create a progressive result emission for the given tier.
    pub fn progressive(stage: ResultStage, result: StreamResult) -> Self {
        BusMessage::ProgressiveResult {
            stream_id: result.stream_id.clone(),
            frame_number: result.frame_number,
            stage,
            confidence: stage.confidence(),
            result,
            timings: None,
            enriched: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a timing breakdown (refined/final tiers).
    pub fn with_timings(mut self, t: ResultTimings) -> Self {
        if let BusMessage::ProgressiveResult { timings, .. } = &mut self {
            *timings = Some(t);
        }
        self
    }

    /// Attach enriched data (final tier).
    pub fn with_enriched(mut self, data: serde_json::Value) -> Self {
        if let BusMessage::ProgressiveResult { enriched, .. } = &mut self {
            *enriched = Some(data);
        }
        self
    }

    /// Job id the message refers to, when it is job-keyed.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            BusMessage::JobEvent { job_id, .. }
            | BusMessage::ProgressUpdate { job_id, .. }
            | BusMessage::FrameEvent { job_id, .. }
            | BusMessage::SceneEvent { job_id, .. } => Some(job_id),
            BusMessage::ProgressiveResult { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_anchors_are_ordered() {
        let anchors: Vec<u8> = PipelineStage::ordered()
            .iter()
            .map(|s| s.progress_anchor())
            .collect();
        assert_eq!(anchors, vec![10, 15, 25, 60, 75, 85, 90, 95, 100]);
        let mut sorted = anchors.clone();
        sorted.sort_unstable();
        assert_eq!(anchors, sorted);
    }

    #[test]
    fn result_stage_confidences() {
        assert_eq!(ResultStage::Partial.confidence(), 0.60);
        assert_eq!(ResultStage::Refined.confidence(), 0.85);
        assert_eq!(ResultStage::Final.confidence(), 0.95);
    }

    #[test]
    fn bus_message_discriminator() {
        let msg = BusMessage::job_event(JobId::from_string("j1"), JobState::Active, 10, 1);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"job_event\""));
        assert!(json.contains("\"state\":\"active\""));

        let decoded: BusMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(decoded, BusMessage::JobEvent { .. }));
    }
}
