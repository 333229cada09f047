//! Consumer-group reader over the per-stream frame logs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use redis::streams::StreamReadReply;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vagent_models::{StreamRecord, FRAME_STREAM_PREFIX, STREAM_CONSUMER_GROUP};

use crate::batcher::{FrameBatcher, PendingRecord};
use crate::error::{StreamError, StreamResult};

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct StreamConsumerConfig {
    /// Redis URL
    pub redis_url: String,
    /// Consumer group name
    pub consumer_group: String,
    /// This consumer's name within the group
    pub consumer_name: String,
    /// Records read per XREADGROUP call
    pub max_batch_size: usize,
    /// Blocking window per read
    pub block: Duration,
    /// How often new `frames:*` streams are discovered
    pub discover_interval: Duration,
}

impl Default for StreamConsumerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            consumer_group: STREAM_CONSUMER_GROUP.to_string(),
            consumer_name: format!("consumer-{}", uuid::Uuid::new_v4()),
            max_batch_size: 16,
            block: Duration::from_secs(1),
            discover_interval: Duration::from_secs(5),
        }
    }
}

impl StreamConsumerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            max_batch_size: std::env::var("STREAM_MAX_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            ..defaults
        }
    }
}

/// Reader over every `frames:<stream-id>` log.
#[derive(Clone)]
pub struct StreamConsumer {
    client: redis::Client,
    config: StreamConsumerConfig,
    known_streams: Arc<Mutex<HashSet<String>>>,
}

impl StreamConsumer {
    /// Create a new stream consumer.
    pub fn new(config: StreamConsumerConfig) -> StreamResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            known_streams: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StreamResult<Self> {
        Self::new(StreamConsumerConfig::from_env())
    }

    /// Scan the fabric for frame logs.
    pub async fn discover_streams(&self) -> StreamResult<Vec<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pattern = format!("{}*", FRAME_STREAM_PREFIX);

        let mut streams = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            streams.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(streams)
    }

    /// Create the consumer group on a stream, lazily and idempotently.
    pub async fn ensure_group(&self, stream: &str) -> StreamResult<()> {
        {
            let known = self.known_streams.lock().await;
            if known.contains(stream) {
                return Ok(());
            }
        }

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!(stream = %stream, "Created consumer group"),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream = %stream, "Consumer group already exists");
            }
            Err(e) => return Err(StreamError::Redis(e)),
        }

        self.known_streams.lock().await.insert(stream.to_string());
        Ok(())
    }

    /// Read new records across all known streams with one blocking call.
    ///
    /// Malformed records (missing client id or frame bytes) are ACKed
    /// and logged, never retried.
    pub async fn read_records(&self, streams: &[String]) -> StreamResult<Vec<PendingRecord>> {
        if streams.is_empty() {
            tokio::time::sleep(self.config.block).await;
            return Ok(Vec::new());
        }

        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(self.config.max_batch_size)
            .arg("BLOCK")
            .arg(self.config.block.as_millis() as u64)
            .arg("STREAMS");
        for stream in streams {
            cmd.arg(stream);
        }
        for _ in streams {
            cmd.arg(">"); // Only new messages
        }

        let reply: Option<StreamReadReply> = cmd.query_async(&mut conn).await?;
        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for stream_key in reply.keys {
            let stream = stream_key.key.clone();
            for entry in stream_key.ids {
                let entry_id = entry.id.clone();

                let mut fields: HashMap<String, String> = HashMap::new();
                for (field, value) in &entry.map {
                    if let redis::Value::BulkString(bytes) = value {
                        fields.insert(field.clone(), String::from_utf8_lossy(bytes).to_string());
                    }
                }

                match StreamRecord::from_field_map(&fields) {
                    Ok(record) => records.push(PendingRecord {
                        stream: stream.clone(),
                        entry_id,
                        record,
                    }),
                    Err(reason) => {
                        warn!(
                            stream = %stream,
                            entry_id = %entry_id,
                            reason = %reason,
                            "Dropping malformed frame record"
                        );
                        metrics::counter!("stream_records_invalid").increment(1);
                        self.ack(&stream, &entry_id).await.ok();
                    }
                }
            }
        }

        Ok(records)
    }

    /// Acknowledge a processed record.
    pub async fn ack(&self, stream: &str, entry_id: &str) -> StreamResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("XACK")
            .arg(stream)
            .arg(&self.config.consumer_group)
            .arg(entry_id)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Run the consume loop until shutdown: discover streams, ensure
    /// groups, read records and feed them into the batcher.
    pub async fn run(
        &self,
        batcher: Arc<FrameBatcher>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> StreamResult<()> {
        info!(
            group = %self.config.consumer_group,
            consumer = %self.config.consumer_name,
            "Starting stream consumer"
        );

        let mut streams: Vec<String> = Vec::new();
        let mut last_discover: Option<tokio::time::Instant> = None;

        loop {
            if *shutdown.borrow() {
                info!("Shutdown signal received, stopping stream consumer");
                break;
            }

            // Refresh the stream set between reads; new `frames:*` logs
            // appear whenever a producer connects.
            let due = last_discover
                .map(|t| t.elapsed() >= self.config.discover_interval)
                .unwrap_or(true);
            if due {
                match self.discover_streams().await {
                    Ok(found) => {
                        for stream in &found {
                            if let Err(e) = self.ensure_group(stream).await {
                                warn!(stream = %stream, error = %e, "Failed to ensure consumer group");
                            }
                        }
                        streams = found;
                    }
                    Err(e) => warn!(error = %e, "Stream discovery failed"),
                }
                last_discover = Some(tokio::time::Instant::now());
            }

            tokio::select! {
                _ = shutdown.changed() => {}
                result = self.read_records(&streams) => {
                    match result {
                        Ok(records) => {
                            for record in records {
                                batcher.push(record).await;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Error reading stream records");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = StreamConsumerConfig::default();
        assert_eq!(config.consumer_group, "videoagent-worker");
        assert_eq!(config.max_batch_size, 16);
        assert_eq!(config.block, Duration::from_secs(1));
    }
}
