//! Video-analysis worker binary.
//!
//! Hosts the job executor (control plane) and the live-stream
//! subsystem (data plane): stream consumer, frame batcher, batch
//! workers and the progressive-results scanner.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vagent_bus::EventBus;
use vagent_index::SimilarityIndex;
use vagent_model_client::ModelClient;
use vagent_queue::{Cacher, JobQueue, QueueConfig};
use vagent_stream::{
    BatchProcessor, BatcherConfig, BusSink, FrameBatcher, ProgressiveConfig, ProgressiveResults,
    StreamConsumer, StreamConsumerConfig,
};
use vagent_worker::{FfmpegDecoder, JobExecutor, PipelineContext, RedisJobStore, WorkerConfig};

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

    info!("Starting vagent-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    let bus = match EventBus::from_env() {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to create event bus: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match JobQueue::new(QueueConfig::from_env(), bus.clone()) {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let index = match SimilarityIndex::from_env() {
        Ok(i) => i,
        Err(e) => {
            error!("Failed to create similarity index client: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = index.initialize_collections().await {
        error!("Failed to initialize vector collections: {}", e);
        std::process::exit(1);
    }

    let model = match ModelClient::from_env() {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to create model client: {}", e);
            std::process::exit(1);
        }
    };

    let store = match RedisJobStore::new(&redis_url, "vagent") {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create job store: {}", e);
            std::process::exit(1);
        }
    };

    let cacher = match Cacher::new(&redis_url, "vagent") {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create cacher: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = Arc::new(PipelineContext {
        config: config.clone(),
        queue,
        bus: bus.clone(),
        index,
        model: model.clone(),
        decoder: Arc::new(FfmpegDecoder::new("/tmp")),
        store,
        cacher,
        http: reqwest::Client::new(),
    });

    let executor = Arc::new(JobExecutor::new(config, ctx));
    let shutdown_rx = executor.shutdown_receiver();

    // Live-stream subsystem
    let progressive_config = ProgressiveConfig::from_env();
    let sink = match BusSink::new(bus, &redis_url, progressive_config.ring_maxlen) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create result sink: {}", e);
            std::process::exit(1);
        }
    };
    let progressive = Arc::new(ProgressiveResults::new(progressive_config, sink));

    let batcher_config = BatcherConfig::from_env();
    let (batcher, batch_rx) = FrameBatcher::new(batcher_config.clone());

    let consumer = match StreamConsumer::new(StreamConsumerConfig::from_env()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create stream consumer: {}", e);
            std::process::exit(1);
        }
    };
    let processor = Arc::new(BatchProcessor::new(
        batcher_config,
        model,
        consumer.clone(),
        Arc::clone(&progressive),
    ));

    let scanner_task = tokio::spawn(Arc::clone(&progressive).run_scanner(shutdown_rx.clone()));
    let timer_task = tokio::spawn(Arc::clone(&batcher).run_timer(shutdown_rx.clone()));
    let processor_task = tokio::spawn(processor.run(batch_rx, shutdown_rx.clone()));
    let consumer_task = {
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = consumer.run(batcher, shutdown_rx).await {
                error!("Stream consumer error: {}", e);
            }
        })
    };

    // Shutdown on ctrl-c
    {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            executor.shutdown();
        });
    }

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    for task in [scanner_task, timer_task, processor_task, consumer_task] {
        task.abort();
    }

    info!("Worker shutdown complete");
}
