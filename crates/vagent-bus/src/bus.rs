//! Redis-backed event bus.

use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use std::pin::Pin;
use tracing::{debug, warn};

use vagent_models::BusMessage;

use crate::error::BusResult;
use crate::topic::{pattern_matches, to_redis_pattern};

/// Lazy stream of `(topic, message)` pairs yielded by a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = (String, BusMessage)> + Send>>;

/// Bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Redis URL
    pub redis_url: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
        }
    }
}

impl BusConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        }
    }
}

/// Pub/sub event bus client.
#[derive(Clone)]
pub struct EventBus {
    client: redis::Client,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new(config: BusConfig) -> BusResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client })
    }

    /// Create from environment variables.
    pub fn from_env() -> BusResult<Self> {
        Self::new(BusConfig::from_env())
    }

    /// Publish a message to a topic.
    ///
    /// Returns once the fabric has accepted the message; fan-out to
    /// subscribers is best-effort.
    pub async fn publish(&self, topic: &str, message: &BusMessage) -> BusResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(message)?;

        debug!(topic = %topic, "Publishing bus message");
        conn.publish::<_, _, ()>(topic, payload).await?;

        Ok(())
    }

    /// Subscribe to all topics matching a pattern.
    ///
    /// `:` separates segments, `*` matches exactly one segment. Returns
    /// a lazy stream; nothing published before the subscription is
    /// replayed.
    pub async fn subscribe(&self, pattern: &str) -> BusResult<EventStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let redis_pattern = to_redis_pattern(pattern);

        pubsub.psubscribe(&redis_pattern).await?;
        debug!(pattern = %pattern, "Subscribed to bus pattern");

        let pattern = pattern.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let pattern = pattern.clone();
            async move {
                let topic = msg.get_channel_name().to_string();
                // Redis glob over-matches; enforce single-segment `*` here.
                if !pattern_matches(&pattern, &topic) {
                    return None;
                }
                let payload: String = msg.get_payload().ok()?;
                match serde_json::from_str::<BusMessage>(&payload) {
                    Ok(message) => Some((topic, message)),
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping undecodable bus message");
                        None
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.redis_url, "redis://localhost:6379");
    }
}
