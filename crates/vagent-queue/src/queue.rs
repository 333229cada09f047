//! Job queue using Redis sorted sets and atomic ops.
//!
//! Layout (all keys under a configurable prefix):
//! - `waiting` zset, score `priority x 10^13 + enqueued_at_ms`: ZPOPMIN
//!   claims the highest-priority, earliest-enqueued job.
//! - `delayed` zset, score `visible_at_ms`: a promotion pass moves due
//!   members to `waiting`.
//! - `active` zset plus a TTL'd heartbeat key per job: the recovery
//!   pass requeues heartbeat-less actives with backoff.
//! - `completed` / `failed` zsets, trimmed to the retention policy.
//! - `job:{id}` JSON document, `result:{id}` result payload,
//!   `cancel:{id}` cancel flag, `dedup:{key}` duplicate guard.

use std::time::Duration;

use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use validator::Validate;

use vagent_bus::{jobs_topic, EventBus, TOPIC_JOBS};
use vagent_models::{
    validate_reference, BusMessage, EnqueueOptions, Job, JobError, JobId, JobRequest, JobState,
    JobStatus, ProcessingResult, QueueMetrics,
};

use crate::error::{QueueError, QueueResult};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key prefix for all queue structures
    pub key_prefix: String,
    /// Poll interval while a blocking claim waits for work
    pub claim_poll: Duration,
    /// Heartbeat TTL; an active job without one is considered stale
    pub heartbeat_ttl: Duration,
    /// Bounded window a cancelled active job has to wind down
    pub shutdown_window: Duration,
    /// TTL on stored results and terminal documents
    pub result_ttl: Duration,
    /// TTL on dedup keys
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vagent".to_string(),
            claim_poll: Duration::from_millis(250),
            heartbeat_ttl: Duration::from_secs(60),
            shutdown_window: Duration::from_secs(30),
            result_ttl: Duration::from_secs(86_400),
            dedup_ttl: Duration::from_secs(3_600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX")
                .unwrap_or_else(|_| "vagent".to_string()),
            heartbeat_ttl: Duration::from_secs(
                std::env::var("QUEUE_HEARTBEAT_TTL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            shutdown_window: Duration::from_secs(
                std::env::var("QUEUE_SHUTDOWN_WINDOW")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            ..defaults
        }
    }
}

/// Outcome a worker reports when acking a job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Processing finished; the optional result becomes pollable.
    Completed(Option<ProcessingResult>),
    /// Processing failed; retried with backoff while attempts remain.
    Failed(JobError),
    /// Processing failed permanently; never retried.
    FailedPermanent(JobError),
    /// Stage timeout; treated as a failure.
    TimedOut,
}

/// Job queue client.
#[derive(Clone)]
pub struct JobQueue {
    client: redis::Client,
    bus: EventBus,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig, bus: EventBus) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            bus,
            config,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let bus = EventBus::from_env()?;
        Self::new(QueueConfig::from_env(), bus)
    }

    pub fn shutdown_window(&self) -> Duration {
        self.config.shutdown_window
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.config.key_prefix, suffix)
    }

    fn job_key(&self, job_id: &JobId) -> String {
        self.key(&format!("job:{}", job_id))
    }

    fn result_key(&self, job_id: &JobId) -> String {
        self.key(&format!("result:{}", job_id))
    }

    fn cancel_key(&self, job_id: &JobId) -> String {
        self.key(&format!("cancel:{}", job_id))
    }

    fn heartbeat_key(&self, job_id: &JobId) -> String {
        self.key(&format!("heartbeat:{}", job_id))
    }

    /// Composite score: priority first (1 highest pops first), FIFO
    /// among equals. `10^13` keeps epoch-millisecond timestamps well
    /// below one priority step.
    fn waiting_score(priority: u8, enqueued_at_ms: i64) -> f64 {
        priority as f64 * 1e13 + enqueued_at_ms as f64
    }

    // ========================================================================
    // Enqueue
    // ========================================================================

    /// Enqueue a job. Returns its id.
    ///
    /// Validation failures (bad priority, rejected reference, duplicate
    /// submission) reject the request before anything is written; no
    /// job is created and no events are published.
    pub async fn enqueue(&self, request: JobRequest, opts: EnqueueOptions) -> QueueResult<JobId> {
        request
            .validate()
            .map_err(|e| QueueError::validation(e.to_string()))?;
        validate_reference(request.origin, &request.reference)
            .into_result()
            .map_err(QueueError::Validation)?;

        let job = Job::from_request(request, &opts);
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Duplicate-submission guard
        let dedup_key = self.key(&format!("dedup:{}", job.idempotency_key()));
        let acquired: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg(job.id.as_str())
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async(&mut conn)
            .await
            .unwrap_or(false);
        if !acquired {
            warn!("Duplicate job rejected: {}", job.idempotency_key());
            return Err(QueueError::validation("duplicate job submission"));
        }

        let payload = serde_json::to_string(&job)?;
        let job_id = job.id.clone();

        let mut pipe = redis::pipe();
        pipe.set(self.job_key(&job_id), &payload).ignore();

        match job.state {
            JobState::Delayed => {
                let visible_at_ms = job
                    .delay_until
                    .map(|t| t.timestamp_millis())
                    .unwrap_or_else(|| Utc::now().timestamp_millis());
                pipe.zadd(self.key("delayed"), job_id.as_str(), visible_at_ms as f64)
                    .ignore();
            }
            _ => {
                let score = Self::waiting_score(job.priority, job.enqueued_at.timestamp_millis());
                pipe.zadd(self.key("waiting"), job_id.as_str(), score).ignore();
            }
        }

        pipe.exec_async(&mut conn).await?;

        self.publish_job_event(&job).await;
        info!(job_id = %job_id, state = %job.state, priority = job.priority, "Enqueued job");

        Ok(job_id)
    }

    // ========================================================================
    // Claim
    // ========================================================================

    /// Blocking claim: highest priority first, FIFO among equals,
    /// delayed jobs only once due. Returns None when `block` elapses
    /// without work.
    pub async fn claim(&self, worker_id: &str, block: Duration) -> QueueResult<Option<Job>> {
        let deadline = tokio::time::Instant::now() + block;

        loop {
            self.promote_delayed().await?;

            if !self.is_paused().await? {
                if let Some(job) = self.try_claim_one(worker_id).await? {
                    return Ok(Some(job));
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.config.claim_poll).await;
        }
    }

    async fn try_claim_one(&self, worker_id: &str) -> QueueResult<Option<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
            .arg(self.key("waiting"))
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let Some((raw_id, _score)) = popped.into_iter().next() else {
            return Ok(None);
        };
        let job_id = JobId::from_string(raw_id);

        let Some(job) = self.load_job(&job_id).await? else {
            warn!(job_id = %job_id, "Claimed id without a document, skipping");
            return Ok(None);
        };

        // A cancel that raced the claim wins.
        if job.state == JobState::Cancelled {
            return Ok(None);
        }

        let job = job.start();
        self.store_job(&job).await?;

        let mut pipe = redis::pipe();
        pipe.zadd(
            self.key("active"),
            job.id.as_str(),
            Utc::now().timestamp_millis() as f64,
        )
        .ignore();
        pipe.set_ex(
            self.heartbeat_key(&job.id),
            worker_id,
            self.config.heartbeat_ttl.as_secs(),
        )
        .ignore();
        pipe.exec_async(&mut conn).await?;

        self.publish_job_event(&job).await;
        debug!(job_id = %job.id, worker = worker_id, attempt = job.attempts_made, "Claimed job");

        Ok(Some(job))
    }

    /// Move due delayed jobs into the waiting set.
    pub async fn promote_delayed(&self) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let now_ms = Utc::now().timestamp_millis();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.key("delayed"))
            .arg(0)
            .arg(now_ms)
            .query_async(&mut conn)
            .await?;

        if due.is_empty() {
            return Ok(0);
        }

        let mut moved = 0;
        for raw_id in due {
            let removed: i64 = conn.zrem(self.key("delayed"), &raw_id).await?;
            if removed == 0 {
                // Another worker promoted it first.
                continue;
            }

            let job_id = JobId::from_string(raw_id);
            let Some(mut job) = self.load_job(&job_id).await? else {
                continue;
            };
            if job.state != JobState::Delayed {
                continue;
            }

            job.state = JobState::Waiting;
            job.delay_until = None;
            self.store_job(&job).await?;

            let score = Self::waiting_score(job.priority, job.enqueued_at.timestamp_millis());
            conn.zadd::<_, _, _, ()>(self.key("waiting"), job.id.as_str(), score)
                .await?;

            self.publish_job_event(&job).await;
            moved += 1;
        }

        if moved > 0 {
            debug!(count = moved, "Promoted delayed jobs");
        }
        Ok(moved)
    }

    // ========================================================================
    // Ack
    // ========================================================================

    /// Acknowledge an active job with its outcome.
    pub async fn ack(&self, job_id: &JobId, outcome: JobOutcome) -> QueueResult<()> {
        let job = self
            .load_job(job_id)
            .await?
            .ok_or_else(|| QueueError::not_found(job_id.to_string()))?;

        if job.state != JobState::Active {
            return Err(QueueError::illegal_transition(format!(
                "cannot ack job {} in state {}",
                job_id, job.state
            )));
        }

        match outcome {
            JobOutcome::Completed(result) => self.finish_completed(job, result).await,
            JobOutcome::Failed(error) => self.finish_failed(job, error, true).await,
            JobOutcome::FailedPermanent(error) => self.finish_failed(job, error, false).await,
            JobOutcome::TimedOut => {
                self.finish_failed(job, JobError::new("timeout", "job stage timed out"), true)
                    .await
            }
        }
    }

    async fn finish_completed(
        &self,
        job: Job,
        result: Option<ProcessingResult>,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let job = job.complete();

        if let Some(result) = &result {
            let payload = serde_json::to_string(result)?;
            conn.set_ex::<_, _, ()>(
                self.result_key(&job.id),
                payload,
                self.config.result_ttl.as_secs(),
            )
            .await?;
        }

        self.store_job(&job).await?;
        self.leave_active(&mut conn, &job.id).await?;

        let finished_ms = Utc::now().timestamp_millis() as f64;
        conn.zadd::<_, _, _, ()>(self.key("completed"), job.id.as_str(), finished_ms)
            .await?;
        self.trim_terminal(&mut conn, "completed", job.retention.keep_completed)
            .await?;

        self.publish_job_event(&job).await;
        info!(job_id = %job.id, attempts = job.attempts_made, "Job completed");
        Ok(())
    }

    async fn finish_failed(&self, job: Job, error: JobError, retriable: bool) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.leave_active(&mut conn, &job.id).await?;

        if retriable && job.attempts_remain() {
            // Retry with exponential backoff through the delayed set.
            let retried = job
                .schedule_retry()
                .expect("attempts_remain checked above");
            let visible_at_ms = retried
                .delay_until
                .map(|t| t.timestamp_millis())
                .unwrap_or_else(|| Utc::now().timestamp_millis());

            self.store_job(&retried).await?;
            conn.zadd::<_, _, _, ()>(
                self.key("delayed"),
                retried.id.as_str(),
                visible_at_ms as f64,
            )
            .await?;

            self.publish_job_event(&retried).await;
            info!(
                job_id = %retried.id,
                attempt = retried.attempts_made,
                max_attempts = retried.max_attempts,
                error = %error.message,
                "Job failed, retry scheduled"
            );
            return Ok(());
        }

        let job = job.fail(error);
        self.store_job(&job).await?;

        let finished_ms = Utc::now().timestamp_millis() as f64;
        conn.zadd::<_, _, _, ()>(self.key("failed"), job.id.as_str(), finished_ms)
            .await?;
        self.trim_terminal(&mut conn, "failed", job.retention.keep_failed)
            .await?;

        self.publish_job_event(&job).await;
        warn!(
            job_id = %job.id,
            attempts = job.attempts_made,
            "Job failed terminally"
        );
        Ok(())
    }

    async fn leave_active(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job_id: &JobId,
    ) -> QueueResult<()> {
        let mut pipe = redis::pipe();
        pipe.zrem(self.key("active"), job_id.as_str()).ignore();
        pipe.del(self.heartbeat_key(job_id)).ignore();
        pipe.del(self.cancel_key(job_id)).ignore();
        pipe.exec_async(conn).await?;
        Ok(())
    }

    /// Evict the oldest terminal documents beyond the retention bound.
    async fn trim_terminal(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        set: &str,
        keep: u32,
    ) -> QueueResult<()> {
        let evicted: Vec<String> = redis::cmd("ZRANGE")
            .arg(self.key(set))
            .arg(0)
            .arg(-(keep as i64) - 1)
            .query_async(conn)
            .await?;

        for raw_id in evicted {
            let job_id = JobId::from_string(raw_id);
            let mut pipe = redis::pipe();
            pipe.zrem(self.key(set), job_id.as_str()).ignore();
            pipe.del(self.job_key(&job_id)).ignore();
            pipe.del(self.result_key(&job_id)).ignore();
            pipe.exec_async(conn).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Cancel
    // ========================================================================

    /// Cancel a job. Succeeds only from waiting/delayed/active.
    ///
    /// Waiting and delayed jobs are cancelled immediately. For an active
    /// job the in-flight worker is signalled; it must exit its current
    /// stage within the shutdown window and record the cancelled state.
    pub async fn cancel(&self, job_id: &JobId) -> QueueResult<bool> {
        let Some(job) = self.load_job(job_id).await? else {
            return Ok(false);
        };

        match job.state {
            JobState::Waiting | JobState::Delayed => {
                let mut conn = self.client.get_multiplexed_async_connection().await?;
                let set = if job.state == JobState::Waiting {
                    "waiting"
                } else {
                    "delayed"
                };
                let removed: i64 = conn.zrem(self.key(set), job_id.as_str()).await?;
                if removed == 0 {
                    // Raced a claim or promotion; the flag still reaches the worker.
                    conn.set_ex::<_, _, ()>(
                        self.cancel_key(job_id),
                        "1",
                        self.config.result_ttl.as_secs(),
                    )
                    .await?;
                    return Ok(true);
                }

                let job = job.cancel();
                self.store_job(&job).await?;
                self.publish_job_event(&job).await;
                info!(job_id = %job_id, "Cancelled queued job");
                Ok(true)
            }
            JobState::Active => {
                let mut conn = self.client.get_multiplexed_async_connection().await?;
                conn.set_ex::<_, _, ()>(
                    self.cancel_key(job_id),
                    "1",
                    self.config.result_ttl.as_secs(),
                )
                .await?;
                info!(job_id = %job_id, "Cancellation signalled to active worker");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Whether a cancel has been requested for the job. Workers poll
    /// this between stages and per frame/scene step.
    pub async fn is_cancel_requested(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.exists(self.cancel_key(job_id)).await?;
        Ok(exists)
    }

    /// Record the cancelled terminal state for an active job. Called by
    /// the worker once it has unwound.
    pub async fn mark_cancelled(&self, job_id: &JobId) -> QueueResult<()> {
        let Some(job) = self.load_job(job_id).await? else {
            return Err(QueueError::not_found(job_id.to_string()));
        };
        if job.state.is_terminal() {
            return Ok(());
        }

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let job = job.cancel();
        self.store_job(&job).await?;
        self.leave_active(&mut conn, &job.id).await?;
        self.publish_job_event(&job).await;
        info!(job_id = %job_id, "Job cancelled");
        Ok(())
    }

    // ========================================================================
    // Status / metrics / progress
    // ========================================================================

    /// Point-in-time status for pollers, including the stored result
    /// for completed jobs. Returns None for unknown ids.
    pub async fn get_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatus>> {
        let Some(job) = self.load_job(job_id).await? else {
            return Ok(None);
        };

        let result = if job.state == JobState::Completed {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let payload: Option<String> = conn.get(self.result_key(job_id)).await?;
            payload.and_then(|s| serde_json::from_str(&s).ok())
        } else {
            None
        };

        Ok(Some(job.status(result)))
    }

    /// Monotonic progress update on the job document.
    pub async fn update_progress(&self, job_id: &JobId, progress: u8) -> QueueResult<()> {
        let Some(job) = self.load_job(job_id).await? else {
            return Err(QueueError::not_found(job_id.to_string()));
        };
        if job.state.is_terminal() {
            return Ok(());
        }
        let job = job.with_progress(progress);
        self.store_job(&job).await?;
        Ok(())
    }

    /// Per-state queue counters.
    pub async fn metrics(&self) -> QueueResult<QueueMetrics> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let waiting: u64 = conn.zcard(self.key("waiting")).await?;
        let active: u64 = conn.zcard(self.key("active")).await?;
        let completed: u64 = conn.zcard(self.key("completed")).await?;
        let failed: u64 = conn.zcard(self.key("failed")).await?;
        let delayed: u64 = conn.zcard(self.key("delayed")).await?;
        let paused = if self.is_paused().await? { waiting } else { 0 };

        Ok(QueueMetrics {
            waiting: if paused > 0 { 0 } else { waiting },
            active,
            completed,
            failed,
            delayed,
            paused,
        })
    }

    /// Claimable backlog, used by the worker autoscaler.
    pub async fn depth(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let waiting: u64 = conn.zcard(self.key("waiting")).await?;
        let delayed: u64 = conn.zcard(self.key("delayed")).await?;
        Ok(waiting + delayed)
    }

    // ========================================================================
    // Pause / resume
    // ========================================================================

    /// Pause claims; queued jobs count as paused in metrics.
    pub async fn pause(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set::<_, _, ()>(self.key("paused"), "1").await?;
        Ok(())
    }

    /// Resume claims.
    pub async fn resume(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(self.key("paused")).await?;
        Ok(())
    }

    async fn is_paused(&self) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.exists(self.key("paused")).await?;
        Ok(exists)
    }

    // ========================================================================
    // Heartbeats / stale recovery
    // ========================================================================

    /// Refresh the heartbeat for an active job. Workers call this every
    /// few seconds during processing.
    pub async fn heartbeat(&self, job_id: &JobId, worker_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(
            self.heartbeat_key(job_id),
            worker_id,
            self.config.heartbeat_ttl.as_secs(),
        )
        .await?;
        Ok(())
    }

    /// Requeue active jobs whose worker stopped heartbeating. Each gets
    /// its attempt counted and the exponential backoff applied; jobs
    /// out of attempts fail terminally.
    pub async fn recover_stale(&self) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let active_ids: Vec<String> = conn.zrange(self.key("active"), 0, -1).await?;

        let mut recovered = 0u32;
        for raw_id in active_ids {
            let job_id = JobId::from_string(raw_id);
            let alive: bool = conn.exists(self.heartbeat_key(&job_id)).await?;
            if alive {
                continue;
            }

            let Some(job) = self.load_job(&job_id).await? else {
                conn.zrem::<_, _, ()>(self.key("active"), job_id.as_str())
                    .await?;
                continue;
            };
            if job.state != JobState::Active {
                conn.zrem::<_, _, ()>(self.key("active"), job_id.as_str())
                    .await?;
                continue;
            }

            warn!(job_id = %job_id, "Recovering job from dead worker");
            self.finish_failed(job, JobError::new("worker_lost", "worker heartbeat expired"), true)
                .await?;
            recovered += 1;
        }

        Ok(recovered)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn load_job(&self, job_id: &JobId) -> QueueResult<Option<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(self.job_key(job_id)).await?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    async fn store_job(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        if job.state.is_terminal() {
            conn.set_ex::<_, _, ()>(
                self.job_key(&job.id),
                payload,
                self.config.result_ttl.as_secs(),
            )
            .await?;
        } else {
            conn.set::<_, _, ()>(self.job_key(&job.id), payload).await?;
        }
        Ok(())
    }

    /// Every state transition fans out to `jobs:<id>` and `jobs`.
    async fn publish_job_event(&self, job: &Job) {
        let event = match &job.error {
            Some(err) => BusMessage::job_event_with_error(
                job.id.clone(),
                job.state,
                job.progress,
                job.attempts_made,
                err.message.clone(),
            ),
            None => BusMessage::job_event(job.id.clone(), job.state, job.progress, job.attempts_made),
        };

        if let Err(e) = self.bus.publish(&jobs_topic(job.id.as_str()), &event).await {
            warn!(job_id = %job.id, error = %e, "Failed to publish job event");
        }
        if let Err(e) = self.bus.publish(TOPIC_JOBS, &event).await {
            warn!(job_id = %job.id, error = %e, "Failed to publish global job event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_score_orders_priority_first() {
        let high_late = JobQueue::waiting_score(1, 2_000_000_000_000);
        let low_early = JobQueue::waiting_score(2, 1_000_000_000_000);
        assert!(high_late < low_early);
    }

    #[test]
    fn waiting_score_fifo_among_equal_priorities() {
        let first = JobQueue::waiting_score(5, 1_000);
        let second = JobQueue::waiting_score(5, 2_000);
        assert!(first < second);
    }

    #[test]
    fn config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.key_prefix, "vagent");
        assert_eq!(config.shutdown_window, Duration::from_secs(30));
        assert_eq!(config.heartbeat_ttl, Duration::from_secs(60));
    }
}
