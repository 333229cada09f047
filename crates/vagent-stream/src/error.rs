//! Stream subsystem error types.

use thiserror::Error;

pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bus error: {0}")]
    Bus(#[from] vagent_bus::BusError),

    #[error("Model error: {0}")]
    Model(#[from] vagent_model_client::ModelError),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl StreamError {
    pub fn channel_closed(msg: impl Into<String>) -> Self {
        Self::ChannelClosed(msg.into())
    }
}
