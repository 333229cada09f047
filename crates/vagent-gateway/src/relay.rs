//! Bus -> room relay.
//!
//! One task per subscribed pattern. Incoming messages are demultiplexed
//! by topic prefix and re-emitted to the matching namespace room; a
//! job-keyed message also reaches `/videoagent` for general
//! subscribers.

use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use vagent_bus::{BusMessage, EventBus};

use crate::session::Namespace;
use crate::state::AppState;

/// Patterns the gateway subscribes to.
pub const RELAY_PATTERNS: [&str; 5] = ["jobs", "jobs:*", "progress:*", "frames:*", "scenes:*"];

/// Wire envelope for relayed events.
#[derive(Debug, Serialize)]
pub struct RelayedEvent<'a> {
    pub topic: &'a str,
    pub event: &'a BusMessage,
}

fn event_type(message: &BusMessage) -> &'static str {
    match message {
        BusMessage::JobEvent { .. } => "job_event",
        BusMessage::ProgressUpdate { .. } => "progress_update",
        BusMessage::FrameEvent { .. } => "frame_event",
        BusMessage::SceneEvent { .. } => "scene_event",
        BusMessage::ProgressiveResult { .. } => "progressive_result",
    }
}

/// Spawn one relay task per pattern.
pub fn spawn_relays(
    state: AppState,
    bus: EventBus,
    shutdown: watch::Receiver<bool>,
) -> Vec<tokio::task::JoinHandle<()>> {
    RELAY_PATTERNS
        .into_iter()
        .map(|pattern| {
            let state = state.clone();
            let bus = bus.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(relay_pattern(state, bus, pattern, shutdown))
        })
        .collect()
}

async fn relay_pattern(
    state: AppState,
    bus: EventBus,
    pattern: &'static str,
    mut shutdown: watch::Receiver<bool>,
) {
    use futures_util::StreamExt;

    loop {
        let mut stream = match bus.subscribe(pattern).await {
            Ok(s) => s,
            Err(e) => {
                warn!(pattern = pattern, error = %e, "Relay subscription failed, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                continue;
            }
        };
        info!(pattern = pattern, "Relay subscribed");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(pattern = pattern, "Relay stopping");
                        return;
                    }
                }
                event = stream.next() => {
                    match event {
                        Some((topic, message)) => dispatch(&state, &topic, &message),
                        None => {
                            warn!(pattern = pattern, "Relay stream ended, resubscribing");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Route one bus message into rooms.
fn dispatch(state: &AppState, topic: &str, message: &BusMessage) {
    let payload = match serde_json::to_string(&RelayedEvent {
        topic,
        event: message,
    }) {
        Ok(p) => p,
        Err(e) => {
            warn!(topic = %topic, error = %e, "Failed to serialize relayed event");
            return;
        }
    };

    state.stats.record_event(event_type(message));

    let mut segments = topic.splitn(2, ':');
    let prefix = segments.next().unwrap_or_default();
    let job_id = segments.next();

    match (Namespace::for_topic_prefix(prefix), job_id) {
        // Job-keyed message: its namespace room plus the /videoagent mirror.
        (Some(namespace), Some(job_id)) => {
            deliver_to_room(state, namespace, job_id, &payload);
            deliver_to_room(state, Namespace::Videoagent, job_id, &payload);
        }
        // Global jobs topic: every /jobs subscriber.
        (Some(Namespace::Jobs), None) => {
            for session in state.registry.namespace_sessions(Namespace::Jobs) {
                send_or_drop(&session.tx, &payload);
            }
        }
        _ => {
            debug!(topic = %topic, "No namespace route for topic");
        }
    }
}

fn deliver_to_room(state: &AppState, namespace: Namespace, job_id: &str, payload: &str) {
    for session in state.registry.room_members(namespace, job_id) {
        send_or_drop(&session.tx, payload);
    }
}

/// Slow consumers lose messages rather than stalling the relay.
fn send_or_drop(tx: &tokio::sync::mpsc::Sender<Message>, payload: &str) {
    if tx.try_send(Message::Text(payload.to_string())).is_err() {
        metrics::counter!("gateway_relay_dropped").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use vagent_models::{JobId, JobState};

    fn app_state() -> AppState {
        AppState::new(crate::config::GatewayConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn job_keyed_message_reaches_room_and_videoagent() {
        let state = app_state();

        let (jobs_tx, mut jobs_rx) = mpsc::channel(4);
        let jobs_session = state.registry.register(Namespace::Jobs, None, jobs_tx);
        state.registry.subscribe(&jobs_session, "j1");

        let (va_tx, mut va_rx) = mpsc::channel(4);
        let va_session = state.registry.register(Namespace::Videoagent, None, va_tx);
        state.registry.subscribe(&va_session, "j1");

        let message = BusMessage::job_event(JobId::from_string("j1"), JobState::Active, 10, 1);
        dispatch(&state, "jobs:j1", &message);

        assert!(jobs_rx.try_recv().is_ok());
        assert!(va_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unsubscribed_sessions_receive_nothing() {
        let state = app_state();

        let (tx, mut rx) = mpsc::channel(4);
        let session = state.registry.register(Namespace::Jobs, None, tx);
        state.registry.subscribe(&session, "j1");

        let message = BusMessage::job_event(JobId::from_string("j2"), JobState::Active, 10, 1);
        dispatch(&state, "jobs:j2", &message);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn global_jobs_topic_broadcasts_to_namespace() {
        let state = app_state();

        let (tx, mut rx) = mpsc::channel(4);
        let _session = state.registry.register(Namespace::Jobs, None, tx);
        // No room subscription needed for the global topic.

        let message = BusMessage::job_event(JobId::from_string("j3"), JobState::Waiting, 0, 0);
        dispatch(&state, "jobs", &message);

        assert!(rx.try_recv().is_ok());
    }
}
