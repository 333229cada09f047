//! Worker error types.
//!
//! The variants map onto the failure taxonomy the queue acts on:
//! validation and invariant violations are never retried, transient
//! external failures back off and retry, cancellation is its own
//! terminal state.

use thiserror::Error;
use vagent_models::JobError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Transient external failure: {0}")]
    ExternalTransient(String),

    #[error("Permanent external failure: {0}")]
    ExternalPermanent(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Queue error: {0}")]
    Queue(#[from] vagent_queue::QueueError),

    #[error("Index error: {0}")]
    Index(#[from] vagent_index::IndexError),

    #[error("Bus error: {0}")]
    Bus(#[from] vagent_bus::BusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::ExternalTransient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::ExternalPermanent(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn decoder(msg: impl Into<String>) -> Self {
        Self::Decoder(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    /// Classify a model-service failure into the taxonomy.
    pub fn from_model(e: vagent_model_client::ModelError) -> Self {
        if e.is_retryable() {
            Self::ExternalTransient(e.to_string())
        } else if matches!(e, vagent_model_client::ModelError::Embedding(_)) {
            Self::Invariant(e.to_string())
        } else {
            Self::ExternalPermanent(e.to_string())
        }
    }

    /// Whether the queue should retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkerError::ExternalTransient(_)
                | WorkerError::DownloadFailed(_)
                | WorkerError::Store(_)
                | WorkerError::Queue(_)
                | WorkerError::Index(_)
                | WorkerError::Bus(_)
                | WorkerError::Io(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }

    /// Stable code surfaced to callers on terminal failure.
    pub fn code(&self) -> &'static str {
        match self {
            WorkerError::Validation(_) => "validation",
            WorkerError::QuotaExceeded(_) => "quota",
            WorkerError::ExternalTransient(_) => "external_transient",
            WorkerError::ExternalPermanent(_) => "external_permanent",
            WorkerError::Invariant(_) => "invariant",
            WorkerError::Cancelled => "cancelled",
            WorkerError::Decoder(_) => "decoder",
            WorkerError::Store(_) => "store",
            WorkerError::DownloadFailed(_) => "download",
            WorkerError::Queue(_) => "queue",
            WorkerError::Index(_) => "index",
            WorkerError::Bus(_) => "bus",
            WorkerError::Io(_) => "io",
        }
    }

    /// Convert into the error document attached to a failed job.
    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_taxonomy() {
        assert!(WorkerError::transient("503").is_retryable());
        assert!(WorkerError::download_failed("timeout").is_retryable());
        assert!(!WorkerError::validation("bad input").is_retryable());
        assert!(!WorkerError::permanent("400").is_retryable());
        assert!(!WorkerError::invariant("bad dim").is_retryable());
        assert!(!WorkerError::Cancelled.is_retryable());
    }

    #[test]
    fn job_error_codes() {
        assert_eq!(WorkerError::validation("x").to_job_error().code, "validation");
        assert_eq!(WorkerError::Cancelled.to_job_error().code, "cancelled");
    }
}
