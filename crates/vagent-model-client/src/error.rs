//! Model client error types.

use thiserror::Error;
use vagent_models::EmbeddingError;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Model service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model response violated the schema: {0}")]
    Schema(String),

    #[error("Embedding invariant violated: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl ModelError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Transient failures (network, timeout, 5xx) are retryable;
    /// 4xx and schema violations are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Network(e) => e.is_timeout() || e.is_connect(),
            ModelError::Status { status, .. } => *status >= 500,
            ModelError::Schema(_) | ModelError::Embedding(_) => false,
        }
    }

    /// Permanent model-side rejections (4xx), never retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            ModelError::Status { status, .. } => (400..500).contains(status),
            ModelError::Schema(_) | ModelError::Embedding(_) => true,
            ModelError::Network(_) => false,
        }
    }
}
