//! Index error types.

use thiserror::Error;
use vagent_models::EmbeddingError;

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Index request failed: {0}")]
    RequestFailed(String),

    #[error("Embedding invariant violated: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    /// Network failures and 5xx responses are retryable; dimension
    /// violations and 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexError::Network(e) => e.is_timeout() || e.is_connect(),
            IndexError::RequestFailed(msg) => msg.contains("status 5"),
            _ => false,
        }
    }
}
