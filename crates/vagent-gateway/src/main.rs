//! Realtime gateway binary.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vagent_bus::EventBus;
use vagent_gateway::relay::spawn_relays;
use vagent_gateway::routes::build_router;
use vagent_gateway::{AppState, GatewayConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("vagent=info".parse().unwrap()))
        .init();

    // Prometheus metrics endpoint
    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        error!("Failed to install metrics exporter: {}", e);
    }

    info!("Starting vagent-gateway");

    let config = GatewayConfig::from_env();
    let listen_addr = config.listen_addr.clone();

    let state = match AppState::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create gateway state: {}", e);
            std::process::exit(1);
        }
    };

    let bus = match EventBus::from_env() {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to create event bus: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let relays = spawn_relays(state.clone(), bus, shutdown_rx);

    let router = build_router(state);
    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };
    info!("Gateway listening on {}", listen_addr);

    let serve = axum::serve(listener, router).with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
    });

    if let Err(e) = serve.await {
        error!("Server error: {}", e);
    }

    let _ = shutdown_tx.send(true);
    for relay in relays {
        relay.abort();
    }

    info!("Gateway shutdown complete");
}
