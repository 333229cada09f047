//! Live-stream frame ingress.
//!
//! `GET /stream` upgrades to a WebSocket that accepts
//! `{type: "frame", frame: {...}}` records and appends them to the
//! `frames:<stream-id>` log. A valid bearer token is required.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use chrono::Utc;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vagent_models::{frame_stream_key, StreamRecord};

use crate::auth::TokenClaims;
use crate::state::AppState;
use crate::ws::close_policy_violation;

/// Inbound ingress message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngressMessage {
    Frame { frame: IngressFrame },
}

/// One frame pushed by a producer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressFrame {
    /// Stream identifier; defaults to the session id
    #[serde(default)]
    pub stream_id: Option<String>,
    pub frame_number: u64,
    /// Base64-encoded image bytes
    pub data: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub timestamp_ms: i64,
}

fn default_format() -> String {
    "jpeg".to_string()
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IngressReply {
    Accepted {
        #[serde(rename = "frameNumber")]
        frame_number: u64,
    },
    Error {
        message: String,
    },
}

/// `GET /stream`: authenticated frame ingress.
pub async fn ws_stream(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let auth = params
        .get("token")
        .ok_or_else(|| "missing bearer token".to_string())
        .and_then(|token| state.verifier.verify(token).map_err(|e| e.to_string()));

    ws.on_upgrade(move |socket| async move {
        match auth {
            Ok(claims) => handle_ingress(socket, state, claims).await,
            Err(reason) => close_policy_violation(socket, reason).await,
        }
    })
}

async fn handle_ingress(mut socket: WebSocket, state: AppState, claims: TokenClaims) {
    let session_id = uuid::Uuid::new_v4().to_string();
    state.stats.record_connection("stream");
    info!(session_id = %session_id, user_id = %claims.user_id, "Ingress connected");

    let mut conn = match state.redis.get_multiplexed_async_connection().await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Ingress cannot reach the fabric");
            return;
        }
    };

    let mut accepted = 0u64;
    while let Some(msg) = socket.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let reply = match serde_json::from_str::<IngressMessage>(&text) {
                    Ok(IngressMessage::Frame { frame }) => {
                        let frame_number = frame.frame_number;
                        match append_frame(&mut conn, &session_id, &claims, frame).await {
                            Ok(()) => {
                                accepted += 1;
                                metrics::counter!("gateway_frames_ingested").increment(1);
                                IngressReply::Accepted { frame_number }
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to append frame");
                                IngressReply::Error {
                                    message: e.to_string(),
                                }
                            }
                        }
                    }
                    Err(e) => IngressReply::Error {
                        message: format!("invalid message: {}", e),
                    },
                };

                if let Ok(json) = serde_json::to_string(&reply) {
                    if socket.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    info!(session_id = %session_id, frames = accepted, "Ingress disconnected");
}

async fn append_frame(
    conn: &mut redis::aio::MultiplexedConnection,
    session_id: &str,
    claims: &TokenClaims,
    frame: IngressFrame,
) -> Result<(), redis::RedisError> {
    if frame.data.is_empty() {
        debug!("Dropping frame with empty payload");
        return Ok(());
    }

    let stream_id = frame
        .stream_id
        .clone()
        .unwrap_or_else(|| session_id.to_string());

    let record = StreamRecord {
        client_id: claims.jti.clone(),
        session_id: session_id.to_string(),
        user_id: claims.user_id.clone(),
        frame_number: frame.frame_number,
        timestamp_ms: if frame.timestamp_ms > 0 {
            frame.timestamp_ms
        } else {
            Utc::now().timestamp_millis()
        },
        data_b64: frame.data,
        width: frame.width,
        height: frame.height,
        format: frame.format,
        received_at: Utc::now(),
    };

    let mut cmd = redis::cmd("XADD");
    cmd.arg(frame_stream_key(&stream_id)).arg("*");
    for (field, value) in record.to_fields() {
        cmd.arg(field).arg(value);
    }
    cmd.query_async::<String>(conn).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_message_parses() {
        let msg: IngressMessage = serde_json::from_str(
            r#"{"type": "frame", "frame": {"streamId": "live-1", "frameNumber": 3, "data": "aGk=", "width": 640, "height": 360}}"#,
        )
        .unwrap();
        let IngressMessage::Frame { frame } = msg;
        assert_eq!(frame.stream_id.as_deref(), Some("live-1"));
        assert_eq!(frame.frame_number, 3);
        assert_eq!(frame.format, "jpeg");
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<IngressMessage>(r#"{"type": "audio"}"#).is_err());
    }
}
