//! Audio transcription artifacts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A diarized transcript segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpeakerSegment {
    /// Speaker label assigned by diarization (e.g. "speaker_0")
    pub speaker: String,
    /// Segment start in seconds
    pub start_sec: f64,
    /// Segment end in seconds
    pub end_sec: f64,
    /// Transcribed text
    pub text: String,
    /// Transcription confidence (0.0–1.0)
    pub confidence: f32,
}

/// Full audio analysis for a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioAnalysis {
    /// Full transcript
    pub transcription: String,
    /// Per-speaker segments
    #[serde(default)]
    pub segments: Vec<SpeakerSegment>,
    /// Detected language (BCP 47)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Topic labels extracted from the transcript
    #[serde(default)]
    pub topics: Vec<String>,
    /// Keyword list
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl AudioAnalysis {
    /// Segments overlapping a `[start_sec, end_sec)` window.
    pub fn segments_in_range(&self, start_sec: f64, end_sec: f64) -> Vec<&SpeakerSegment> {
        self.segments
            .iter()
            .filter(|s| s.start_sec < end_sec && s.end_sec > start_sec)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_in_range() {
        let analysis = AudioAnalysis {
            transcription: "hello world".to_string(),
            segments: vec![
                SpeakerSegment {
                    speaker: "speaker_0".to_string(),
                    start_sec: 0.0,
                    end_sec: 5.0,
                    text: "hello".to_string(),
                    confidence: 0.9,
                },
                SpeakerSegment {
                    speaker: "speaker_1".to_string(),
                    start_sec: 5.0,
                    end_sec: 10.0,
                    text: "world".to_string(),
                    confidence: 0.8,
                },
            ],
            ..Default::default()
        };

        let hits = analysis.segments_in_range(4.0, 6.0);
        assert_eq!(hits.len(), 2);
        let hits = analysis.segments_in_range(6.0, 8.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].speaker, "speaker_1");
    }
}
