//! Worker configuration.

use std::time::Duration;

use vagent_models::AggregationMethod;

/// Worker configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Minimum concurrent jobs
    pub min_workers: usize,
    /// Maximum concurrent jobs (autoscaled by queue depth)
    pub max_workers: usize,
    /// Parallel vision calls within one job
    pub frame_concurrency: usize,
    /// Heartbeat interval while processing
    pub heartbeat_interval: Duration,
    /// Cancellation poll interval
    pub cancel_poll_interval: Duration,
    /// Autoscale / stale-recovery tick
    pub maintenance_interval: Duration,
    /// Blocking claim window
    pub claim_block: Duration,
    /// HTTP download timeout
    pub download_timeout: Duration,
    /// Frame-embedding aggregation method
    pub aggregation: AggregationMethod,
    /// Vision prompt for pipeline frames
    pub vision_prompt: String,
    /// Vision token budget per frame
    pub vision_max_tokens: u32,
    /// Optional base URL for resolving third-party drive handles
    pub drive_fetch_base_url: Option<String>,
    /// Optional bearer token used as auth fallback for stream-host downloads
    pub stream_host_auth_token: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 10,
            frame_concurrency: 4,
            heartbeat_interval: Duration::from_secs(10),
            cancel_poll_interval: Duration::from_millis(500),
            maintenance_interval: Duration::from_secs(30),
            claim_block: Duration::from_secs(5),
            download_timeout: Duration::from_secs(300),
            aggregation: AggregationMethod::Mean,
            vision_prompt: "Analyze this video frame. Respond with JSON: \
                            {description, features, objects, text_regions}."
                .to_string(),
            vision_max_tokens: 1024,
            drive_fetch_base_url: None,
            stream_host_auth_token: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_workers: env_parse("WORKER_MIN_CONCURRENCY", defaults.min_workers),
            max_workers: env_parse("WORKER_MAX_CONCURRENCY", defaults.max_workers),
            frame_concurrency: env_parse("FRAME_CONCURRENCY", defaults.frame_concurrency),
            download_timeout: Duration::from_secs(env_parse(
                "DOWNLOAD_TIMEOUT_SECS",
                defaults.download_timeout.as_secs(),
            )),
            aggregation: std::env::var("EMBEDDING_AGGREGATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.aggregation),
            drive_fetch_base_url: std::env::var("DRIVE_FETCH_BASE_URL").ok(),
            stream_host_auth_token: std::env::var("STREAM_HOST_AUTH_TOKEN").ok(),
            ..defaults
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.min_workers, 2);
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.frame_concurrency, 4);
        assert_eq!(config.aggregation, AggregationMethod::Mean);
    }
}
