//! Gateway configuration.

use std::time::Duration;

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address
    pub listen_addr: String,
    /// Redis URL (frame ingress XADD)
    pub redis_url: String,
    /// JWT signing secret
    pub jwt_secret: String,
    /// Expected token issuer
    pub jwt_issuer: String,
    /// Ping interval per session
    pub ping_interval: Duration,
    /// Idle timeout after which a session is force-terminated
    pub idle_timeout: Duration,
    /// Per-socket bounded send buffer
    pub send_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            jwt_secret: "dev-secret".to_string(),
            jwt_issuer: "videoagent".to_string(),
            ping_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(30),
            send_buffer: 32,
        }
    }
}

impl GatewayConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: std::env::var("GATEWAY_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: std::env::var("GATEWAY_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret".to_string()),
            jwt_issuer: std::env::var("GATEWAY_JWT_ISSUER")
                .unwrap_or_else(|_| "videoagent".to_string()),
            ping_interval: Duration::from_secs(
                std::env::var("GATEWAY_PING_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            idle_timeout: Duration::from_secs(
                std::env::var("GATEWAY_IDLE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            ..defaults
        }
    }
}
