//! Structured job logging.

use tracing::{error, info, warn};
use vagent_models::JobId;

/// Job-scoped logger with consistent structured fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.to_string(),
        }
    }

    pub fn stage(&self, stage: &str, message: &str) {
        info!(job_id = %self.job_id, stage = stage, "{}", message);
    }

    pub fn warn(&self, stage: &str, message: &str) {
        warn!(job_id = %self.job_id, stage = stage, "{}", message);
    }

    pub fn error(&self, stage: &str, message: &str) {
        error!(job_id = %self.job_id, stage = stage, "{}", message);
    }
}
