//! Live-stream frame records and per-frame inference results.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::vision::FrameAnalysis;

/// Consumer group shared by all live-stream workers.
pub const STREAM_CONSUMER_GROUP: &str = "videoagent-worker";

/// Key prefix for per-stream frame logs.
pub const FRAME_STREAM_PREFIX: &str = "frames:";

/// Append-log key for a stream's frames.
pub fn frame_stream_key(stream_id: &str) -> String {
    format!("{}{}", FRAME_STREAM_PREFIX, stream_id)
}

/// A live frame as written to `frames:<stream-id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StreamRecord {
    /// Producer client id
    pub client_id: String,
    /// Realtime session that produced the frame
    pub session_id: String,
    /// Owning user
    pub user_id: String,
    /// Frame number assigned by the producer
    pub frame_number: u64,
    /// Producer timestamp (epoch ms)
    pub timestamp_ms: i64,
    /// Base64-encoded image bytes
    pub data_b64: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format ("jpeg", "png", ...)
    pub format: String,
    /// When the gateway accepted the frame
    pub received_at: DateTime<Utc>,
}

impl StreamRecord {
    /// Field list for XADD.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("client_id", self.client_id.clone()),
            ("session_id", self.session_id.clone()),
            ("user_id", self.user_id.clone()),
            ("frame_number", self.frame_number.to_string()),
            ("timestamp_ms", self.timestamp_ms.to_string()),
            ("data", self.data_b64.clone()),
            ("width", self.width.to_string()),
            ("height", self.height.to_string()),
            ("format", self.format.clone()),
            ("received_at", self.received_at.to_rfc3339()),
        ]
    }

    /// Rebuild from the string field map read off the log.
    ///
    /// Records missing a client id or frame bytes are rejected; the
    /// consumer ACKs and drops them.
    pub fn from_field_map(map: &HashMap<String, String>) -> Result<Self, String> {
        let client_id = map
            .get("client_id")
            .filter(|v| !v.is_empty())
            .ok_or("missing client_id")?
            .clone();
        let data_b64 = map
            .get("data")
            .filter(|v| !v.is_empty())
            .ok_or("missing frame data")?
            .clone();

        let get = |key: &str| map.get(key).cloned().unwrap_or_default();
        let parse_u64 = |key: &str| get(key).parse::<u64>().unwrap_or(0);
        let parse_u32 = |key: &str| get(key).parse::<u32>().unwrap_or(0);

        let received_at = map
            .get("received_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Self {
            client_id,
            session_id: get("session_id"),
            user_id: get("user_id"),
            frame_number: parse_u64("frame_number"),
            timestamp_ms: get("timestamp_ms").parse::<i64>().unwrap_or(0),
            data_b64,
            width: parse_u32("width"),
            height: parse_u32("height"),
            format: {
                let f = get("format");
                if f.is_empty() {
                    "jpeg".to_string()
                } else {
                    f
                }
            },
            received_at,
        })
    }
}

/// Inference result for one live frame.
///
/// Results for a stream may arrive out of frame-number order; consumers
/// key by `(stream_id, frame_number)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StreamResult {
    /// Originating stream
    pub stream_id: String,
    /// Frame number within the stream
    pub frame_number: u64,
    /// Vision analysis, defaulted when the call failed
    pub analysis: FrameAnalysis,
    /// Per-frame failure, if the vision call did not succeed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Inference wall-clock time in milliseconds
    pub elapsed_ms: u64,
    /// When the result was assembled
    pub processed_at: DateTime<Utc>,
}

impl StreamResult {
    pub fn new(stream_id: impl Into<String>, frame_number: u64, analysis: FrameAnalysis) -> Self {
        Self {
            stream_id: stream_id.into(),
            frame_number,
            analysis,
            error: None,
            elapsed_ms: 0,
            processed_at: Utc::now(),
        }
    }

    /// Error result keyed to a frame whose inference failed.
    pub fn failed(
        stream_id: impl Into<String>,
        frame_number: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            frame_number,
            analysis: FrameAnalysis::default(),
            error: Some(error.into()),
            elapsed_ms: 0,
            processed_at: Utc::now(),
        }
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn record_roundtrip_through_fields() {
        let record = StreamRecord {
            client_id: "c1".to_string(),
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            frame_number: 42,
            timestamp_ms: 1_700_000_000_000,
            data_b64: "aGVsbG8=".to_string(),
            width: 640,
            height: 360,
            format: "jpeg".to_string(),
            received_at: Utc::now(),
        };

        let map: HashMap<String, String> = record
            .to_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let decoded = StreamRecord::from_field_map(&map).unwrap();
        assert_eq!(decoded.client_id, "c1");
        assert_eq!(decoded.frame_number, 42);
        assert_eq!(decoded.width, 640);
    }

    #[test]
    fn record_requires_client_and_data() {
        let missing_client = field_map(&[("data", "aGVsbG8=")]);
        assert!(StreamRecord::from_field_map(&missing_client).is_err());

        let missing_data = field_map(&[("client_id", "c1")]);
        assert!(StreamRecord::from_field_map(&missing_data).is_err());

        let empty_data = field_map(&[("client_id", "c1"), ("data", "")]);
        assert!(StreamRecord::from_field_map(&empty_data).is_err());
    }

    #[test]
    fn stream_key() {
        assert_eq!(frame_stream_key("live-1"), "frames:live-1");
    }
}
