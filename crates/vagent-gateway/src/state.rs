//! Shared gateway state.

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::config::GatewayConfig;
use crate::session::SessionRegistry;
use crate::stats::GatewayStats;

/// State threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub registry: Arc<SessionRegistry>,
    pub stats: Arc<GatewayStats>,
    pub verifier: TokenVerifier,
    pub redis: redis::Client,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self, redis::RedisError> {
        let verifier = TokenVerifier::new(&config.jwt_secret, &config.jwt_issuer);
        let redis = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            stats: Arc::new(GatewayStats::new()),
            verifier,
            redis,
        })
    }
}
