//! Three-tier progressive results.
//!
//! Each live frame's first result is emitted immediately as a partial
//! (confidence 0.60). A background scanner ticks at 100 ms and promotes
//! states to refined (0.85) after the refinement delay and to final
//! (0.95, full timing breakdown plus enrichment) after the final delay,
//! removing the state once the final is out. In-flight states are
//! discarded on restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vagent_bus::EventBus;
use vagent_models::{BusMessage, ResultStage, ResultTimings, StreamResult};

use crate::error::StreamResult as StreamOpResult;

/// Progressive-results configuration.
#[derive(Debug, Clone)]
pub struct ProgressiveConfig {
    /// Delay between partial and refined
    pub refinement_delay: Duration,
    /// Delay between refined and final
    pub final_delay: Duration,
    /// Scanner tick
    pub scan_interval: Duration,
    /// Ring-stream bound (approximate trim)
    pub ring_maxlen: u64,
}

impl Default for ProgressiveConfig {
    fn default() -> Self {
        Self {
            refinement_delay: Duration::from_millis(500),
            final_delay: Duration::from_millis(1500),
            scan_interval: Duration::from_millis(100),
            ring_maxlen: 10_000,
        }
    }
}

impl ProgressiveConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            refinement_delay: Duration::from_millis(
                std::env::var("PROGRESSIVE_REFINEMENT_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            final_delay: Duration::from_millis(
                std::env::var("PROGRESSIVE_FINAL_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1500),
            ),
            ..defaults
        }
    }
}

/// Where emissions go. The production sink publishes to the bus and
/// appends to the bounded `results:*` ring streams.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn emit(&self, stage: ResultStage, message: &BusMessage) -> StreamOpResult<()>;
}

/// Production sink: bus publish plus ring-stream append.
pub struct BusSink {
    bus: EventBus,
    client: redis::Client,
    ring_maxlen: u64,
}

impl BusSink {
    pub fn new(bus: EventBus, redis_url: &str, ring_maxlen: u64) -> StreamOpResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            bus,
            client,
            ring_maxlen,
        })
    }
}

#[async_trait]
impl ResultSink for BusSink {
    async fn emit(&self, stage: ResultStage, message: &BusMessage) -> StreamOpResult<()> {
        self.bus.publish(stage.topic(), message).await?;

        // Bounded history with approximate trimming.
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(message)?;
        redis::cmd("XADD")
            .arg(stage.topic())
            .arg("MAXLEN")
            .arg("~")
            .arg(self.ring_maxlen)
            .arg("*")
            .arg("result")
            .arg(&payload)
            .query_async::<String>(&mut conn)
            .await?;

        Ok(())
    }
}

/// Per-frame emission state.
struct ProgressiveState {
    result: StreamResult,
    created_at_ms: i64,
    partial_at: Option<Instant>,
    partial_ms: Option<i64>,
    refined_at: Option<Instant>,
    refined_ms: Option<i64>,
    refined_sent: bool,
    final_sent: bool,
    enriched: Option<serde_json::Value>,
}

type StateKey = (String, u64);

/// The progressive-results engine.
pub struct ProgressiveResults {
    config: ProgressiveConfig,
    states: Mutex<HashMap<StateKey, ProgressiveState>>,
    sink: Arc<dyn ResultSink>,
}

impl ProgressiveResults {
    pub fn new(config: ProgressiveConfig, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Number of in-flight states.
    pub async fn in_flight(&self) -> usize {
        self.states.lock().await.len()
    }

    /// Attach enrichment data delivered with the final emission.
    pub async fn set_enriched(&self, stream_id: &str, frame_number: u64, data: serde_json::Value) {
        let key = (stream_id.to_string(), frame_number);
        let mut states = self.states.lock().await;
        if let Some(state) = states.get_mut(&key) {
            state.enriched = Some(data);
        }
    }

    /// Handle a fresh base result: create state and send the partial
    /// immediately.
    pub async fn handle_result(&self, result: StreamResult) -> StreamOpResult<()> {
        let key = (result.stream_id.clone(), result.frame_number);
        let now = Instant::now();
        let now_ms = Utc::now().timestamp_millis();

        let message = BusMessage::progressive(ResultStage::Partial, result.clone());

        {
            let mut states = self.states.lock().await;
            states.insert(
                key,
                ProgressiveState {
                    result,
                    created_at_ms: now_ms,
                    partial_at: Some(now),
                    partial_ms: Some(now_ms),
                    refined_at: None,
                    refined_ms: None,
                    refined_sent: false,
                    final_sent: false,
                    enriched: None,
                },
            );
        }

        self.sink.emit(ResultStage::Partial, &message).await?;
        metrics::counter!("progressive_partial_emitted").increment(1);
        Ok(())
    }

    /// One scanner pass: snapshot due transitions under the lock, then
    /// emit outside it.
    pub async fn scan_once(&self) -> StreamOpResult<()> {
        let now = Instant::now();
        let now_ms = Utc::now().timestamp_millis();
        let mut emissions: Vec<(ResultStage, BusMessage)> = Vec::new();

        {
            let mut states = self.states.lock().await;
            let mut finished: Vec<StateKey> = Vec::new();

            for (key, state) in states.iter_mut() {
                if !state.refined_sent {
                    let partial_elapsed = state
                        .partial_at
                        .map(|t| now.duration_since(t))
                        .unwrap_or_default();
                    if partial_elapsed >= self.config.refinement_delay {
                        state.refined_sent = true;
                        state.refined_at = Some(now);
                        state.refined_ms = Some(now_ms);

                        let timings = ResultTimings {
                            created_at_ms: state.created_at_ms,
                            partial_ms: state.partial_ms,
                            refined_ms: state.refined_ms,
                            final_ms: None,
                            refinement_time_ms: state
                                .partial_ms
                                .map(|p| now_ms - p),
                            total_time_ms: None,
                        };
                        let message =
                            BusMessage::progressive(ResultStage::Refined, state.result.clone())
                                .with_timings(timings);
                        emissions.push((ResultStage::Refined, message));
                    }
                } else if !state.final_sent {
                    let refined_elapsed = state
                        .refined_at
                        .map(|t| now.duration_since(t))
                        .unwrap_or_default();
                    if refined_elapsed >= self.config.final_delay {
                        state.final_sent = true;

                        let timings = ResultTimings {
                            created_at_ms: state.created_at_ms,
                            partial_ms: state.partial_ms,
                            refined_ms: state.refined_ms,
                            final_ms: Some(now_ms),
                            refinement_time_ms: match (state.partial_ms, state.refined_ms) {
                                (Some(p), Some(r)) => Some(r - p),
                                _ => None,
                            },
                            total_time_ms: Some(now_ms - state.created_at_ms),
                        };
                        let mut message =
                            BusMessage::progressive(ResultStage::Final, state.result.clone())
                                .with_timings(timings);
                        if let Some(enriched) = &state.enriched {
                            message = message.with_enriched(enriched.clone());
                        }
                        emissions.push((ResultStage::Final, message));
                        finished.push(key.clone());
                    }
                }

            }

            for key in finished {
                states.remove(&key);
            }
        }

        for (stage, message) in emissions {
            if let Err(e) = self.sink.emit(stage, &message).await {
                warn!(stage = stage.as_str(), error = %e, "Failed to emit progressive result");
            } else {
                match stage {
                    ResultStage::Refined => {
                        metrics::counter!("progressive_refined_emitted").increment(1)
                    }
                    ResultStage::Final => {
                        metrics::counter!("progressive_final_emitted").increment(1)
                    }
                    ResultStage::Partial => {}
                }
            }
        }

        Ok(())
    }

    /// Run the 100 ms scanner until shutdown.
    pub async fn run_scanner(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            refinement_delay_ms = self.config.refinement_delay.as_millis() as u64,
            final_delay_ms = self.config.final_delay.as_millis() as u64,
            "Starting progressive-results scanner"
        );

        let mut tick = tokio::time::interval(self.config.scan_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let remaining = self.in_flight().await;
                        if remaining > 0 {
                            debug!(remaining = remaining, "Discarding in-flight progressive states");
                        }
                        break;
                    }
                }
                _ = tick.tick() => {
                    if let Err(e) = self.scan_once().await {
                        warn!(error = %e, "Progressive scan failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vagent_models::FrameAnalysis;

    /// Collects emissions in memory.
    struct CollectorSink {
        emitted: Mutex<Vec<(ResultStage, BusMessage)>>,
    }

    impl CollectorSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                emitted: Mutex::new(Vec::new()),
            })
        }

        async fn stages(&self) -> Vec<ResultStage> {
            self.emitted.lock().await.iter().map(|(s, _)| *s).collect()
        }
    }

    #[async_trait]
    impl ResultSink for CollectorSink {
        async fn emit(&self, stage: ResultStage, message: &BusMessage) -> StreamOpResult<()> {
            self.emitted.lock().await.push((stage, message.clone()));
            Ok(())
        }
    }

    fn short_config() -> ProgressiveConfig {
        ProgressiveConfig {
            refinement_delay: Duration::from_millis(30),
            final_delay: Duration::from_millis(50),
            scan_interval: Duration::from_millis(5),
            ring_maxlen: 100,
        }
    }

    fn result() -> StreamResult {
        StreamResult::new("live-1", 1, FrameAnalysis::default())
    }

    #[tokio::test]
    async fn partial_is_emitted_immediately() {
        let sink = CollectorSink::new();
        let engine = ProgressiveResults::new(short_config(), sink.clone());

        engine.handle_result(result()).await.unwrap();

        assert_eq!(sink.stages().await, vec![ResultStage::Partial]);
        assert_eq!(engine.in_flight().await, 1);
    }

    #[tokio::test]
    async fn full_lifecycle_in_order() {
        let sink = CollectorSink::new();
        let engine = ProgressiveResults::new(short_config(), sink.clone());

        engine.handle_result(result()).await.unwrap();

        // Not yet due
        engine.scan_once().await.unwrap();
        assert_eq!(sink.stages().await, vec![ResultStage::Partial]);

        tokio::time::sleep(Duration::from_millis(35)).await;
        engine.scan_once().await.unwrap();
        assert_eq!(
            sink.stages().await,
            vec![ResultStage::Partial, ResultStage::Refined]
        );

        tokio::time::sleep(Duration::from_millis(55)).await;
        engine.scan_once().await.unwrap();
        assert_eq!(
            sink.stages().await,
            vec![ResultStage::Partial, ResultStage::Refined, ResultStage::Final]
        );

        // State removed after the final emission.
        assert_eq!(engine.in_flight().await, 0);
    }

    #[tokio::test]
    async fn confidences_match_tiers() {
        let sink = CollectorSink::new();
        let engine = ProgressiveResults::new(short_config(), sink.clone());

        engine.handle_result(result()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;
        engine.scan_once().await.unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;
        engine.scan_once().await.unwrap();

        let emitted = sink.emitted.lock().await;
        let confidences: Vec<f32> = emitted
            .iter()
            .map(|(_, m)| match m {
                BusMessage::ProgressiveResult { confidence, .. } => *confidence,
                _ => panic!("unexpected message"),
            })
            .collect();
        assert_eq!(confidences, vec![0.60, 0.85, 0.95]);
    }

    #[tokio::test]
    async fn final_carries_timings_and_enrichment() {
        let sink = CollectorSink::new();
        let engine = ProgressiveResults::new(short_config(), sink.clone());

        engine.handle_result(result()).await.unwrap();
        engine
            .set_enriched("live-1", 1, serde_json::json!({"labels": ["cat"]}))
            .await;

        tokio::time::sleep(Duration::from_millis(35)).await;
        engine.scan_once().await.unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;
        engine.scan_once().await.unwrap();

        let emitted = sink.emitted.lock().await;
        let (_, final_msg) = emitted.last().unwrap();
        match final_msg {
            BusMessage::ProgressiveResult {
                stage,
                timings,
                enriched,
                ..
            } => {
                assert_eq!(*stage, ResultStage::Final);
                let timings = timings.expect("final carries timings");
                assert!(timings.total_time_ms.unwrap() >= 80);
                assert!(timings.refinement_time_ms.unwrap() >= 30);
                assert!(enriched.is_some());
            }
            _ => panic!("unexpected message"),
        }
    }

    #[tokio::test]
    async fn frames_are_keyed_independently() {
        let sink = CollectorSink::new();
        let engine = ProgressiveResults::new(short_config(), sink.clone());

        engine.handle_result(result()).await.unwrap();
        engine
            .handle_result(StreamResult::new("live-1", 2, FrameAnalysis::default()))
            .await
            .unwrap();

        assert_eq!(engine.in_flight().await, 2);
    }
}
