//! Job definitions and the queue state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::options::ProcessingOptions;
use crate::result::ProcessingResult;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where the video comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum JobOrigin {
    /// Public HTTP(S) URL
    Url,
    /// Third-party drive file handle
    Drive,
    /// Direct upload (buffer already on disk)
    Upload,
    /// Live stream identifier
    LiveStream,
}

impl JobOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOrigin::Url => "url",
            JobOrigin::Drive => "drive",
            JobOrigin::Upload => "upload",
            JobOrigin::LiveStream => "live-stream",
        }
    }
}

impl fmt::Display for JobOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job state in the queue.
///
/// Transitions are monotonic along
/// `waiting -> (delayed) -> active -> {completed | failed | cancelled}`;
/// a retry moves a failed attempt back through `delayed`/`waiting`
/// without ever touching a terminal document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in queue, eligible for claim
    #[default]
    Waiting,
    /// Job is not yet visible (delay or retry backoff pending)
    Delayed,
    /// Job is being processed by exactly one worker
    Active,
    /// Job completed successfully
    Completed,
    /// Job failed terminally (attempts exhausted or permanent error)
    Failed,
    /// Job was cancelled by the caller
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Terminal states are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether a transition to `next` is legal.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match self {
            Waiting => matches!(next, Active | Cancelled),
            Delayed => matches!(next, Waiting | Cancelled),
            // Active -> Waiting/Delayed covers worker-death requeue and retry backoff.
            Active => matches!(next, Completed | Failed | Cancelled | Waiting | Delayed),
            Completed | Failed | Cancelled => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Delay before attempt n+1 is `base_secs x 2^(n−1)`.
    Exponential { base_secs: u64 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential { base_secs: 5 }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt, given the number of attempts already made.
    pub fn delay_secs(&self, attempts_made: u32) -> u64 {
        match self {
            BackoffPolicy::Exponential { base_secs } => {
                let exp = attempts_made.saturating_sub(1).min(16);
                base_secs.saturating_mul(1u64 << exp)
            }
        }
    }
}

/// How many terminal job documents are retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RetentionPolicy {
    /// Completed jobs kept (oldest evicted first)
    #[serde(default = "default_keep_completed")]
    pub keep_completed: u32,
    /// Failed jobs kept
    #[serde(default = "default_keep_failed")]
    pub keep_failed: u32,
}

fn default_keep_completed() -> u32 {
    100
}

fn default_keep_failed() -> u32 {
    500
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
        }
    }
}

/// Terminal error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    /// Stable machine-readable code (e.g. "validation", "external_permanent")
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Optional structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Enqueue-time knobs, separate from the processing options.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EnqueueOptions {
    /// Priority 1–10, 1 highest
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Seconds to hold the job before it becomes claimable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u64>,
    /// Maximum attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff between attempts
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Per-job stage timeout in seconds
    #[serde(default = "default_job_timeout_secs")]
    pub timeout_secs: u64,
    /// Terminal-document retention
    #[serde(default)]
    pub retention: RetentionPolicy,
}

fn default_priority() -> u8 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_job_timeout_secs() -> u64 {
    300
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            delay_secs: None,
            max_attempts: default_max_attempts(),
            backoff: BackoffPolicy::default(),
            timeout_secs: default_job_timeout_secs(),
            retention: RetentionPolicy::default(),
        }
    }
}

/// Ingress request to create a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct JobRequest {
    /// Video origin
    pub origin: JobOrigin,
    /// URL, file handle, upload path or stream identifier
    #[validate(length(min = 1, max = 2048))]
    pub reference: String,
    /// Owner
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    /// Optional realtime session that created the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Processing options
    #[serde(default)]
    pub options: ProcessingOptions,
    /// Priority 1–10, 1 highest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 10))]
    pub priority: Option<u8>,
    /// Delay in seconds before the job becomes claimable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u64>,
}

/// A job document as stored on the fabric.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Owner
    pub user_id: String,

    /// Video origin
    pub origin: JobOrigin,

    /// URL, file handle, upload path or stream identifier
    pub reference: String,

    /// Realtime session that created the job, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Processing options
    pub options: ProcessingOptions,

    /// Priority 1–10, 1 highest
    pub priority: u8,

    /// Absolute instant before which the job is not claimable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_until: Option<DateTime<Utc>>,

    /// Attempts already made (first execution counts as 1)
    #[serde(default)]
    pub attempts_made: u32,

    /// Maximum attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff between attempts
    #[serde(default)]
    pub backoff: BackoffPolicy,

    /// Per-job stage timeout in seconds
    #[serde(default = "default_job_timeout_secs")]
    pub timeout_secs: u64,

    /// Terminal-document retention
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Lifecycle state
    #[serde(default)]
    pub state: JobState,

    /// Progress (0–100), non-decreasing
    #[serde(default)]
    pub progress: u8,

    /// When the job was enqueued
    pub enqueued_at: DateTime<Utc>,

    /// When the current attempt started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Terminal error, set only for failed jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl Job {
    /// Build a job from an ingress request plus enqueue options.
    pub fn from_request(request: JobRequest, opts: &EnqueueOptions) -> Self {
        let now = Utc::now();
        let priority = request.priority.unwrap_or(opts.priority).clamp(1, 10);
        let delay_secs = request.delay_secs.or(opts.delay_secs);
        let delay_until = delay_secs
            .filter(|s| *s > 0)
            .map(|s| now + chrono::Duration::seconds(s as i64));

        Self {
            id: JobId::new(),
            user_id: request.user_id,
            origin: request.origin,
            reference: request.reference,
            session_id: request.session_id,
            options: request.options,
            priority,
            delay_until,
            attempts_made: 0,
            max_attempts: opts.max_attempts.max(1),
            backoff: opts.backoff,
            timeout_secs: opts.timeout_secs,
            retention: opts.retention,
            state: if delay_until.is_some() {
                JobState::Delayed
            } else {
                JobState::Waiting
            },
            progress: 0,
            enqueued_at: now,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Mark claimed by a worker.
    pub fn start(mut self) -> Self {
        self.state = JobState::Active;
        self.attempts_made += 1;
        self.started_at = Some(Utc::now());
        self
    }

    /// Mark completed.
    pub fn complete(mut self) -> Self {
        self.state = JobState::Completed;
        self.finished_at = Some(Utc::now());
        self.progress = 100;
        self
    }

    /// Mark terminally failed.
    pub fn fail(mut self, error: JobError) -> Self {
        self.state = JobState::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        self
    }

    /// Mark cancelled.
    pub fn cancel(mut self) -> Self {
        self.state = JobState::Cancelled;
        self.finished_at = Some(Utc::now());
        self
    }

    /// Schedule the next retry attempt; returns None when attempts are exhausted.
    pub fn schedule_retry(mut self) -> Option<Self> {
        if self.attempts_made >= self.max_attempts {
            return None;
        }
        let delay = self.backoff.delay_secs(self.attempts_made);
        self.delay_until = Some(Utc::now() + chrono::Duration::seconds(delay as i64));
        self.state = JobState::Delayed;
        self.started_at = None;
        Some(self)
    }

    /// Whether more attempts remain after a failure.
    pub fn attempts_remain(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    /// Monotonic progress update.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = self.progress.max(progress.min(100));
        self
    }

    /// Dedup key for duplicate-submission rejection.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.user_id, self.origin, self.reference)
    }

    /// Status snapshot for pollers.
    pub fn status(&self, result: Option<ProcessingResult>) -> JobStatus {
        JobStatus {
            job_id: self.id.clone(),
            state: self.state,
            progress: self.progress,
            attempts_made: self.attempts_made,
            enqueued_at: self.enqueued_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            error: self.error.clone(),
            result,
        }
    }
}

/// Point-in-time view of a job returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStatus {
    pub job_id: JobId,
    pub state: JobState,
    pub progress: u8,
    pub attempts_made: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProcessingResult>,
}

/// Per-state queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueueMetrics {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JobRequest {
        JobRequest {
            origin: JobOrigin::Url,
            reference: "https://host/v.mp4".to_string(),
            user_id: "u1".to_string(),
            session_id: None,
            options: ProcessingOptions::default(),
            priority: None,
            delay_secs: None,
        }
    }

    #[test]
    fn job_state_transitions() {
        assert!(JobState::Waiting.can_transition_to(JobState::Active));
        assert!(JobState::Delayed.can_transition_to(JobState::Waiting));
        assert!(JobState::Active.can_transition_to(JobState::Completed));
        assert!(JobState::Active.can_transition_to(JobState::Cancelled));
        assert!(!JobState::Completed.can_transition_to(JobState::Waiting));
        assert!(!JobState::Failed.can_transition_to(JobState::Active));
        assert!(!JobState::Cancelled.can_transition_to(JobState::Waiting));
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Active.is_terminal());
    }

    #[test]
    fn backoff_law() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_secs(1), 5);
        assert_eq!(policy.delay_secs(2), 10);
        assert_eq!(policy.delay_secs(3), 20);
        assert_eq!(policy.delay_secs(4), 40);
    }

    #[test]
    fn job_from_request_defaults() {
        let job = Job::from_request(request(), &EnqueueOptions::default());
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.priority, 5);
        assert_eq!(job.max_attempts, 3);
        assert_eq!(job.attempts_made, 0);
    }

    #[test]
    fn delayed_job_starts_delayed() {
        let mut req = request();
        req.delay_secs = Some(60);
        let job = Job::from_request(req, &EnqueueOptions::default());
        assert_eq!(job.state, JobState::Delayed);
        assert!(job.delay_until.is_some());
    }

    #[test]
    fn retry_schedule_exhausts() {
        let job = Job::from_request(request(), &EnqueueOptions::default());
        let job = job.start(); // attempt 1
        let retried = job.schedule_retry().expect("attempt 2 available");
        assert_eq!(retried.state, JobState::Delayed);

        let retried = retried.start(); // attempt 2
        let retried = retried.schedule_retry().expect("attempt 3 available");
        let exhausted = retried.start(); // attempt 3
        assert!(exhausted.schedule_retry().is_none());
    }

    #[test]
    fn progress_is_monotonic() {
        let job = Job::from_request(request(), &EnqueueOptions::default());
        let job = job.with_progress(60);
        let job = job.with_progress(25);
        assert_eq!(job.progress, 60);
    }

    #[test]
    fn priority_is_clamped() {
        let mut req = request();
        req.priority = Some(99);
        let job = Job::from_request(req, &EnqueueOptions::default());
        assert_eq!(job.priority, 10);
    }
}
