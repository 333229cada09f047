//! Realtime gateway.
//!
//! Five logical namespaces (`/videoagent`, `/jobs`, `/progress`,
//! `/frames`, `/scenes`) under path base `/ws`, a bearer-authenticated
//! live-stream ingress at `/stream`, and relay tasks that demultiplex
//! bus messages into per-job rooms. The orchestrator and the gateway
//! both depend on the bus; neither depends on the other.

pub mod auth;
pub mod config;
pub mod error;
pub mod ingress;
pub mod relay;
pub mod routes;
pub mod session;
pub mod state;
pub mod stats;
pub mod ws;

pub use auth::{TokenClaims, TokenVerifier};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use session::{Namespace, SessionRegistry};
pub use state::AppState;
pub use stats::GatewayStats;
