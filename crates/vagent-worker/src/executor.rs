//! Job executor: claims jobs, runs the pipeline, reports outcomes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vagent_models::Job;
use vagent_queue::JobOutcome;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::pipeline::{CancelToken, PipelineContext, PipelineOrchestrator};
use crate::retry::FailureTracker;

/// Claims jobs from the queue and executes them with bounded,
/// depth-autoscaled concurrency.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: Arc<PipelineContext>,
    orchestrator: Arc<PipelineOrchestrator>,
    shutdown: watch::Sender<bool>,
    worker_id: String,
    active_jobs: Arc<AtomicUsize>,
    target_workers: Arc<AtomicUsize>,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, ctx: Arc<PipelineContext>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let orchestrator = Arc::new(PipelineOrchestrator::new(Arc::clone(&ctx)));
        let worker_id = format!("worker-{}", Uuid::new_v4());
        let target = config.min_workers;

        Self {
            config,
            ctx,
            orchestrator,
            shutdown,
            worker_id,
            active_jobs: Arc::new(AtomicUsize::new(0)),
            target_workers: Arc::new(AtomicUsize::new(target)),
        }
    }

    /// Subscribe to the executor's shutdown channel.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run the claim loop until shutdown, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            worker_id = %self.worker_id,
            min = self.config.min_workers,
            max = self.config.max_workers,
            "Starting job executor"
        );

        let maintenance = self.spawn_maintenance();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.claim_and_spawn() => {
                    if let Err(e) = result {
                        error!("Error claiming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        maintenance.abort();

        info!("Waiting for in-flight jobs to drain...");
        let drain = self.ctx.queue.shutdown_window();
        let _ = tokio::time::timeout(drain, self.wait_for_jobs()).await;

        info!("Job executor stopped");
        Ok(())
    }

    async fn claim_and_spawn(&self) -> WorkerResult<()> {
        let active = self.active_jobs.load(Ordering::SeqCst);
        let target = self.target_workers.load(Ordering::SeqCst);
        if active >= target {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let Some(job) = self
            .ctx
            .queue
            .claim(&self.worker_id, self.config.claim_block)
            .await?
        else {
            return Ok(());
        };

        self.active_jobs.fetch_add(1, Ordering::SeqCst);
        metrics::gauge!("worker_active_jobs").set(self.active_jobs.load(Ordering::SeqCst) as f64);

        let ctx = Arc::clone(&self.ctx);
        let orchestrator = Arc::clone(&self.orchestrator);
        let config = self.config.clone();
        let worker_id = self.worker_id.clone();
        let active_jobs = Arc::clone(&self.active_jobs);

        tokio::spawn(async move {
            Self::execute_job(ctx, orchestrator, config, worker_id, job).await;
            active_jobs.fetch_sub(1, Ordering::SeqCst);
            metrics::gauge!("worker_active_jobs").set(active_jobs.load(Ordering::SeqCst) as f64);
        });

        Ok(())
    }

    /// Periodic maintenance: stale-job recovery and depth-based
    /// autoscaling of the worker target between the configured bounds.
    fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.ctx.queue.clone();
        let target = Arc::clone(&self.target_workers);
        let min = self.config.min_workers;
        let max = self.config.max_workers;
        let interval = self.config.maintenance_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tick.tick() => {
                        match queue.recover_stale().await {
                            Ok(recovered) if recovered > 0 => {
                                warn!(count = recovered, "Recovered stale jobs");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Stale recovery failed"),
                        }

                        match queue.depth().await {
                            Ok(depth) => {
                                let desired = (depth as usize).clamp(min, max);
                                let previous = target.swap(desired, Ordering::SeqCst);
                                if previous != desired {
                                    debug!(depth = depth, workers = desired, "Autoscaled worker target");
                                }
                                metrics::gauge!("worker_target_concurrency").set(desired as f64);
                            }
                            Err(e) => warn!(error = %e, "Depth probe failed"),
                        }
                    }
                }
            }
        })
    }

    /// Execute one job: heartbeats, cancellation watch, stage timeout,
    /// and outcome reporting.
    async fn execute_job(
        ctx: Arc<PipelineContext>,
        orchestrator: Arc<PipelineOrchestrator>,
        config: WorkerConfig,
        worker_id: String,
        job: Job,
    ) {
        let job_id = job.id.clone();
        info!(job_id = %job_id, attempt = job.attempts_made, "Executing job");

        let cancel = CancelToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        // Cancellation watcher: polls the queue's cancel flag.
        let watcher = {
            let queue = ctx.queue.clone();
            let job_id = job_id.clone();
            let cancel = cancel.clone();
            let mut done = done_rx.clone();
            let poll = config.cancel_poll_interval;
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(poll);
                loop {
                    tokio::select! {
                        _ = done.changed() => break,
                        _ = tick.tick() => {
                            match queue.is_cancel_requested(&job_id).await {
                                Ok(true) => {
                                    info!(job_id = %job_id, "Cancellation requested");
                                    cancel.cancel();
                                    break;
                                }
                                Ok(false) => {}
                                Err(e) => debug!(job_id = %job_id, error = %e, "Cancel poll failed"),
                            }
                        }
                    }
                }
            })
        };

        // Heartbeat keeps the at-most-one-active claim alive.
        let heartbeat = {
            let queue = ctx.queue.clone();
            let job_id = job_id.clone();
            let worker_id = worker_id.clone();
            let mut done = done_rx;
            let interval = config.heartbeat_interval;
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval);
                let mut failures = FailureTracker::new(3);
                loop {
                    tokio::select! {
                        _ = done.changed() => break,
                        _ = tick.tick() => {
                            match queue.heartbeat(&job_id, &worker_id).await {
                                Ok(()) => failures.record_success(),
                                Err(e) => {
                                    if failures.record_failure() {
                                        warn!(job_id = %job_id, error = %e, "Heartbeat failed");
                                    }
                                }
                            }
                        }
                    }
                }
            })
        };

        let timeout = Duration::from_secs(job.timeout_secs);
        let outcome = tokio::time::timeout(timeout, orchestrator.process(&job, &cancel)).await;

        let _ = done_tx.send(true);
        watcher.abort();
        heartbeat.abort();

        match outcome {
            Ok(Ok(result)) => {
                info!(job_id = %job_id, elapsed_sec = result.elapsed_sec, "Job completed");
                if let Err(e) = ctx.queue.ack(&job_id, JobOutcome::Completed(Some(result))).await {
                    error!(job_id = %job_id, error = %e, "Failed to ack completed job");
                }
            }
            Ok(Err(e)) if e.is_cancelled() => {
                info!(job_id = %job_id, "Job cancelled, discarding partial artifacts");
                orchestrator.discard_artifacts(&job).await;
                if let Err(e) = ctx.queue.mark_cancelled(&job_id).await {
                    error!(job_id = %job_id, error = %e, "Failed to record cancellation");
                }
            }
            Ok(Err(e)) => {
                error!(job_id = %job_id, error = %e, "Job failed");
                let outcome = if e.is_retryable() {
                    JobOutcome::Failed(e.to_job_error())
                } else {
                    JobOutcome::FailedPermanent(e.to_job_error())
                };
                if let Err(ack_err) = ctx.queue.ack(&job_id, outcome).await {
                    error!(job_id = %job_id, error = %ack_err, "Failed to ack failed job");
                }
            }
            Err(_elapsed) => {
                // A cancel that arrived during the final stage may
                // surface as a timeout; cancellation wins.
                if cancel.is_cancelled() {
                    orchestrator.discard_artifacts(&job).await;
                    if let Err(e) = ctx.queue.mark_cancelled(&job_id).await {
                        error!(job_id = %job_id, error = %e, "Failed to record cancellation");
                    }
                    return;
                }
                warn!(job_id = %job_id, timeout_secs = job.timeout_secs, "Job timed out");
                if let Err(e) = ctx.queue.ack(&job_id, JobOutcome::TimedOut).await {
                    error!(job_id = %job_id, error = %e, "Failed to ack timed-out job");
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.active_jobs.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
