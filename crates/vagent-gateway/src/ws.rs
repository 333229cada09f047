//! Namespace WebSocket endpoints.

use std::borrow::Cow;
use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::auth::CLOSE_POLICY_VIOLATION;
use crate::session::Namespace;
use crate::state::AppState;

/// Messages a subscriber may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    #[serde(rename = "subscribe:job")]
    Subscribe {
        #[serde(rename = "jobId")]
        job_id: String,
    },
    #[serde(rename = "unsubscribe:job")]
    Unsubscribe {
        #[serde(rename = "jobId")]
        job_id: String,
    },
}

/// Acks sent back on the control channel.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Subscribed {
        #[serde(rename = "jobId")]
        job_id: String,
    },
    Unsubscribed {
        #[serde(rename = "jobId")]
        job_id: String,
    },
    Error {
        message: String,
    },
}

/// `GET /ws/:namespace`: subscribe socket. A bearer token is optional
/// for read-only subscription; an invalid one closes with 1008.
pub async fn ws_namespace(
    Path(namespace): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let Ok(namespace) = namespace.parse::<Namespace>() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // Optional auth: validate only when a token is supplied.
    let auth = match params.get("token") {
        Some(token) => match state.verifier.verify(token) {
            Ok(claims) => Ok(Some(claims.user_id)),
            Err(e) => Err(e.to_string()),
        },
        None => Ok(None),
    };

    ws.on_upgrade(move |socket| async move {
        match auth {
            Ok(user_id) => handle_subscriber(socket, state, namespace, user_id).await,
            Err(reason) => close_policy_violation(socket, reason).await,
        }
    })
}

/// Close with the policy-violation code and a reason string.
pub async fn close_policy_violation(mut socket: WebSocket, reason: String) {
    warn!(reason = %reason, "Closing socket: authentication failed");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_POLICY_VIOLATION,
            reason: Cow::Owned(reason),
        })))
        .await;
}

async fn handle_subscriber(
    socket: WebSocket,
    state: AppState,
    namespace: Namespace,
    user_id: Option<String>,
) {
    let (ws_sender, mut receiver) = socket.split();

    // Bounded send channel for backpressure; the relay drops messages
    // for slow consumers rather than blocking.
    let (tx, mut rx) = mpsc::channel::<Message>(state.config.send_buffer);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let session = state.registry.register(namespace, user_id, tx.clone());
    state.stats.record_connection(namespace.as_str());
    info!(session_id = %session.id, namespace = namespace.as_str(), "Subscriber connected");

    let mut ping = interval(state.config.ping_interval);
    // First tick fires immediately; skip it.
    ping.tick().await;
    let mut idle_check = interval(state.config.idle_timeout / 3);

    loop {
        tokio::select! {
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Text(text))) => {
                        session.touch();
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { job_id }) => {
                                state.registry.subscribe(&session, &job_id);
                                debug!(session_id = %session.id, job_id = %job_id, "Joined job room");
                                ControlMessage::Subscribed { job_id }
                            }
                            Ok(ClientMessage::Unsubscribe { job_id }) => {
                                state.registry.unsubscribe(&session, &job_id);
                                ControlMessage::Unsubscribed { job_id }
                            }
                            Err(e) => ControlMessage::Error {
                                message: format!("invalid message: {}", e),
                            },
                        };
                        if let Ok(json) = serde_json::to_string(&reply) {
                            let _ = tx.send(Message::Text(json)).await;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => {
                        session.touch();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session_id = %session.id, "Client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(session_id = %session.id, error = %e, "Socket error");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            _ = idle_check.tick() => {
                if session.idle_for() > state.config.idle_timeout {
                    warn!(session_id = %session.id, "Terminating idle session");
                    let _ = tx.send(Message::Close(Some(CloseFrame {
                        code: 1000,
                        reason: Cow::Borrowed("idle timeout"),
                    }))).await;
                    break;
                }
            }
        }
    }

    state.registry.unregister(&session.id);
    drop(tx);
    let _ = send_task.await;
    info!(session_id = %session.id, "Subscriber disconnected");
}
