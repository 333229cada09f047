//! Micro-batching of live frames for GPU inference.
//!
//! A mutex-guarded accumulation slice flushes at `max_batch_size` or
//! when the batch-wait timer elapses since the first record was added.
//! The timer resets on every flush. A full batch channel drops the
//! newest batch and counts it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vagent_model_client::ModelClient;
use vagent_models::{parse_vision_response, StreamRecord, StreamResult};

use crate::consumer::StreamConsumer;
use crate::progressive::ProgressiveResults;

/// Batcher configuration.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Records per batch
    pub max_batch_size: usize,
    /// Flush timer since the first record of a batch
    pub batch_wait: Duration,
    /// Timer scan granularity
    pub timer_tick: Duration,
    /// Concurrent batch workers
    pub batch_workers: usize,
    /// Bounded batch channel capacity
    pub channel_capacity: usize,
    /// Vision prompt for live frames
    pub vision_prompt: String,
    /// Vision token budget per frame
    pub vision_max_tokens: u32,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 16,
            batch_wait: Duration::from_millis(50),
            timer_tick: Duration::from_millis(10),
            batch_workers: 2,
            channel_capacity: 8,
            vision_prompt: "Describe this live video frame. Respond with JSON: \
                            {description, features, objects, text_regions}."
                .to_string(),
            vision_max_tokens: 512,
        }
    }
}

impl BatcherConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_batch_size: std::env::var("BATCH_MAX_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            batch_wait: Duration::from_millis(
                std::env::var("BATCH_WAIT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(50),
            ),
            batch_workers: std::env::var("BATCH_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            ..defaults
        }
    }
}

/// A record pending batch processing, with its ACK coordinates.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    /// Source log key (`frames:<stream-id>`)
    pub stream: String,
    /// Log entry id used for XACK
    pub entry_id: String,
    /// Parsed record
    pub record: StreamRecord,
}

impl PendingRecord {
    /// Stream id without the log prefix.
    pub fn stream_id(&self) -> &str {
        self.stream
            .strip_prefix(vagent_models::FRAME_STREAM_PREFIX)
            .unwrap_or(&self.stream)
    }
}

struct PendingState {
    records: Vec<PendingRecord>,
    /// Set when the first record of the current batch arrived;
    /// cleared on every flush.
    first_added_at: Option<Instant>,
}

/// Accumulates records and flushes size- or time-bounded batches into
/// a bounded channel.
pub struct FrameBatcher {
    config: BatcherConfig,
    pending: Mutex<PendingState>,
    batch_tx: mpsc::Sender<Vec<PendingRecord>>,
    dropped_batches: AtomicU64,
}

impl FrameBatcher {
    /// Create the batcher and the receiving end of its batch channel.
    pub fn new(config: BatcherConfig) -> (Arc<Self>, mpsc::Receiver<Vec<PendingRecord>>) {
        let (batch_tx, batch_rx) = mpsc::channel(config.channel_capacity);
        let batcher = Arc::new(Self {
            config,
            pending: Mutex::new(PendingState {
                records: Vec::new(),
                first_added_at: None,
            }),
            batch_tx,
            dropped_batches: AtomicU64::new(0),
        });
        (batcher, batch_rx)
    }

    /// Add a record; flushes immediately when the batch fills.
    pub async fn push(&self, record: PendingRecord) {
        let full_batch = {
            let mut pending = self.pending.lock().expect("batcher mutex poisoned");
            if pending.first_added_at.is_none() {
                pending.first_added_at = Some(Instant::now());
            }
            pending.records.push(record);

            if pending.records.len() >= self.config.max_batch_size {
                // Full flush resets the timer so an empty batch is not
                // flushed early on the next tick.
                pending.first_added_at = None;
                Some(std::mem::take(&mut pending.records))
            } else {
                None
            }
        };
        // The lock is released before touching the channel.

        if let Some(batch) = full_batch {
            self.send_batch(batch);
        }
    }

    /// Flush when the batch-wait timer has elapsed since the first
    /// record was added. Called by the timer task.
    fn flush_if_due(&self) {
        let due_batch = {
            let mut pending = self.pending.lock().expect("batcher mutex poisoned");
            match pending.first_added_at {
                Some(first) if first.elapsed() >= self.config.batch_wait => {
                    pending.first_added_at = None;
                    Some(std::mem::take(&mut pending.records))
                }
                _ => None,
            }
        };

        if let Some(batch) = due_batch {
            if !batch.is_empty() {
                self.send_batch(batch);
            }
        }
    }

    /// Force out whatever is pending. Used during shutdown drain.
    pub fn flush_now(&self) {
        let batch = {
            let mut pending = self.pending.lock().expect("batcher mutex poisoned");
            pending.first_added_at = None;
            std::mem::take(&mut pending.records)
        };
        if !batch.is_empty() {
            self.send_batch(batch);
        }
    }

    fn send_batch(&self, batch: Vec<PendingRecord>) {
        let size = batch.len();
        match self.batch_tx.try_send(batch) {
            Ok(()) => {
                debug!(size = size, "Flushed frame batch");
                metrics::counter!("stream_batches_flushed").increment(1);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Newest-batch drop is deliberate: live-stream loss is
                // preferable to blocking the consumer.
                let dropped = self.dropped_batches.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!("stream_batches_dropped").increment(1);
                warn!(size = size, total_dropped = dropped, "Batch channel full, dropping batch");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Batch channel closed, discarding batch");
            }
        }
    }

    /// Batches dropped because the channel was full.
    pub fn dropped_batches(&self) -> u64 {
        self.dropped_batches.load(Ordering::Relaxed)
    }

    /// Run the flush timer until shutdown.
    pub async fn run_timer(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.config.timer_tick);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.flush_now();
                        break;
                    }
                }
                _ = tick.tick() => {
                    self.flush_if_due();
                }
            }
        }
    }
}

/// Pool of batch workers running vision inference per record.
pub struct BatchProcessor {
    config: BatcherConfig,
    model: ModelClient,
    consumer: StreamConsumer,
    progressive: Arc<ProgressiveResults>,
}

impl BatchProcessor {
    pub fn new(
        config: BatcherConfig,
        model: ModelClient,
        consumer: StreamConsumer,
        progressive: Arc<ProgressiveResults>,
    ) -> Self {
        Self {
            config,
            model,
            consumer,
            progressive,
        }
    }

    /// Dispatch batches to at most `batch_workers` concurrent tasks
    /// until the channel closes or shutdown is signalled.
    pub async fn run(
        self: Arc<Self>,
        mut batch_rx: mpsc::Receiver<Vec<PendingRecord>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(workers = self.config.batch_workers, "Starting batch workers");
        let semaphore = Arc::new(Semaphore::new(self.config.batch_workers));

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutdown signal received, stopping batch workers");
                        break;
                    }
                }
                batch = batch_rx.recv() => {
                    let Some(batch) = batch else { break };
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };
                    let processor = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _permit = permit;
                        processor.process_batch(batch).await;
                    });
                }
            }
        }
    }

    /// Process every record of a batch concurrently. A failing or
    /// panicking record is isolated: its siblings still ACK and emit.
    async fn process_batch(&self, batch: Vec<PendingRecord>) {
        let size = batch.len();
        let mut tasks = JoinSet::new();

        for pending in batch {
            let model = self.model.clone();
            let consumer = self.consumer.clone();
            let progressive = Arc::clone(&self.progressive);
            let prompt = self.config.vision_prompt.clone();
            let max_tokens = self.config.vision_max_tokens;

            tasks.spawn(async move {
                let result = Self::process_record(&model, &prompt, max_tokens, &pending.record, pending.stream_id()).await;

                if let Err(e) = progressive.handle_result(result).await {
                    warn!(
                        stream = %pending.stream,
                        frame = pending.record.frame_number,
                        error = %e,
                        "Failed to emit stream result"
                    );
                }
                if let Err(e) = consumer.ack(&pending.stream, &pending.entry_id).await {
                    warn!(
                        stream = %pending.stream,
                        entry_id = %pending.entry_id,
                        error = %e,
                        "Failed to ack stream record"
                    );
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                // Panic isolation: the record is lost, the batch lives on.
                warn!(error = %e, "Batch record task failed");
                metrics::counter!("stream_record_tasks_failed").increment(1);
            }
        }

        debug!(size = size, "Processed frame batch");
    }

    async fn process_record(
        model: &ModelClient,
        prompt: &str,
        max_tokens: u32,
        record: &StreamRecord,
        stream_id: &str,
    ) -> StreamResult {
        let started = Instant::now();
        debug!(stream = %stream_id, frame = record.frame_number, "Running vision on live frame");

        match model.vision(&record.data_b64, prompt, max_tokens).await {
            Ok(response) => {
                let analysis = parse_vision_response(&response.content);
                StreamResult::new(stream_id, record.frame_number, analysis)
                    .with_elapsed_ms(started.elapsed().as_millis() as u64)
            }
            Err(e) => {
                metrics::counter!("stream_vision_failures").increment(1);
                StreamResult::failed(stream_id, record.frame_number, e.to_string())
                    .with_elapsed_ms(started.elapsed().as_millis() as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(n: u64) -> PendingRecord {
        PendingRecord {
            stream: "frames:live-1".to_string(),
            entry_id: format!("0-{}", n),
            record: StreamRecord {
                client_id: "c1".to_string(),
                session_id: "s1".to_string(),
                user_id: "u1".to_string(),
                frame_number: n,
                timestamp_ms: 0,
                data_b64: "aGVsbG8=".to_string(),
                width: 64,
                height: 64,
                format: "jpeg".to_string(),
                received_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn flushes_on_full_batch() {
        let config = BatcherConfig {
            max_batch_size: 4,
            ..BatcherConfig::default()
        };
        let (batcher, mut rx) = FrameBatcher::new(config);

        for n in 0..4 {
            batcher.push(record(n)).await;
        }

        let batch = rx.try_recv().expect("full batch should flush immediately");
        assert_eq!(batch.len(), 4);
    }

    #[tokio::test]
    async fn flushes_on_timer() {
        let config = BatcherConfig {
            max_batch_size: 16,
            batch_wait: Duration::from_millis(20),
            ..BatcherConfig::default()
        };
        let (batcher, mut rx) = FrameBatcher::new(config);

        batcher.push(record(0)).await;
        batcher.push(record(1)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        batcher.flush_if_due();

        let batch = rx.try_recv().expect("timer flush");
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn timer_does_not_flush_early() {
        let config = BatcherConfig {
            max_batch_size: 16,
            batch_wait: Duration::from_millis(200),
            ..BatcherConfig::default()
        };
        let (batcher, mut rx) = FrameBatcher::new(config);

        batcher.push(record(0)).await;
        batcher.flush_if_due();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drops_newest_batch_when_channel_full() {
        let config = BatcherConfig {
            max_batch_size: 1,
            channel_capacity: 1,
            ..BatcherConfig::default()
        };
        let (batcher, mut rx) = FrameBatcher::new(config);

        // First batch fills the channel, second is dropped.
        batcher.push(record(0)).await;
        batcher.push(record(1)).await;

        assert_eq!(batcher.dropped_batches(), 1);
        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered[0].record.frame_number, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stream_id_strips_prefix() {
        assert_eq!(record(0).stream_id(), "live-1");
    }
}
