//! Queue integration tests.
//!
//! Validation behavior runs anywhere; lifecycle tests need a local
//! Redis and are ignored by default.

use std::time::Duration;

use vagent_bus::{BusConfig, EventBus};
use vagent_models::{EnqueueOptions, JobOrigin, JobRequest, JobState, ProcessingOptions};
use vagent_queue::{JobOutcome, JobQueue, QueueConfig, QueueError};

fn request(reference: &str) -> JobRequest {
    JobRequest {
        origin: JobOrigin::Url,
        reference: reference.to_string(),
        user_id: "test-user".to_string(),
        session_id: None,
        options: ProcessingOptions::default(),
        priority: None,
        delay_secs: None,
    }
}

fn queue_with_url(redis_url: &str) -> JobQueue {
    let bus = EventBus::new(BusConfig {
        redis_url: redis_url.to_string(),
    })
    .expect("bus");
    JobQueue::new(
        QueueConfig {
            redis_url: redis_url.to_string(),
            key_prefix: format!("vagent-test-{}", std::process::id()),
            ..QueueConfig::default()
        },
        bus,
    )
    .expect("queue")
}

fn local_queue() -> JobQueue {
    dotenvy::dotenv().ok();
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    queue_with_url(&url)
}

/// Validation rejects before anything touches the fabric, so these run
/// without Redis.
mod validation {
    use super::*;

    #[tokio::test]
    async fn path_traversal_is_rejected_without_creating_a_job() {
        let queue = queue_with_url("redis://127.0.0.1:1");

        let err = queue
            .enqueue(request("file:///tmp/../etc/passwd"), EnqueueOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }

    #[tokio::test]
    async fn disallowed_root_is_rejected() {
        let queue = queue_with_url("redis://127.0.0.1:1");

        let err = queue
            .enqueue(request("file:///etc/passwd"), EnqueueOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }

    #[tokio::test]
    async fn bad_priority_is_rejected() {
        let queue = queue_with_url("redis://127.0.0.1:1");

        let mut req = request("https://host/v.mp4");
        req.priority = Some(11);
        let err = queue.enqueue(req, EnqueueOptions::default()).await.unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_reference_is_rejected() {
        let queue = queue_with_url("redis://127.0.0.1:1");

        let err = queue
            .enqueue(request(""), EnqueueOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn enqueue_claim_complete_cycle() {
    let queue = local_queue();

    let job_id = queue
        .enqueue(request("https://host/a.mp4"), EnqueueOptions::default())
        .await
        .expect("enqueue");

    let status = queue.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(status.state, JobState::Waiting);
    assert_eq!(status.attempts_made, 0);

    let job = queue
        .claim("test-worker", Duration::from_secs(2))
        .await
        .unwrap()
        .expect("claimed job");
    assert_eq!(job.id, job_id);
    assert_eq!(job.state, JobState::Active);
    assert_eq!(job.attempts_made, 1);

    queue.ack(&job_id, JobOutcome::Completed(None)).await.unwrap();

    let status = queue.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.progress, 100);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn priority_orders_claims() {
    let queue = local_queue();

    let mut low = request("https://host/low.mp4");
    low.priority = Some(9);
    let mut high = request("https://host/high.mp4");
    high.priority = Some(1);

    queue.enqueue(low, EnqueueOptions::default()).await.unwrap();
    let high_id = queue.enqueue(high, EnqueueOptions::default()).await.unwrap();

    let first = queue
        .claim("test-worker", Duration::from_secs(2))
        .await
        .unwrap()
        .expect("claimed job");
    assert_eq!(first.id, high_id, "priority 1 claims before priority 9");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn failed_job_retries_with_backoff() {
    let queue = local_queue();

    let job_id = queue
        .enqueue(request("https://host/flaky.mp4"), EnqueueOptions::default())
        .await
        .unwrap();

    let job = queue
        .claim("test-worker", Duration::from_secs(2))
        .await
        .unwrap()
        .expect("claimed job");

    queue
        .ack(
            &job.id,
            JobOutcome::Failed(vagent_models::JobError::new("external_transient", "503")),
        )
        .await
        .unwrap();

    // First retry backs off 5s; immediately after the failure it is
    // delayed, not claimable.
    let status = queue.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(status.state, JobState::Delayed);
    assert_eq!(status.attempts_made, 1);

    let nothing = queue
        .claim("test-worker", Duration::from_millis(500))
        .await
        .unwrap();
    assert!(nothing.is_none(), "job must not be claimable before backoff elapses");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn cancel_waiting_job() {
    let queue = local_queue();

    let job_id = queue
        .enqueue(request("https://host/cancel-me.mp4"), EnqueueOptions::default())
        .await
        .unwrap();

    assert!(queue.cancel(&job_id).await.unwrap());

    let status = queue.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(status.state, JobState::Cancelled);

    // Terminal: cancelling again reports false.
    assert!(!queue.cancel(&job_id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn cancel_active_job_signals_worker() {
    let queue = local_queue();

    let job_id = queue
        .enqueue(request("https://host/long.mp4"), EnqueueOptions::default())
        .await
        .unwrap();
    let job = queue
        .claim("test-worker", Duration::from_secs(2))
        .await
        .unwrap()
        .expect("claimed job");

    assert!(queue.cancel(&job.id).await.unwrap());
    assert!(queue.is_cancel_requested(&job.id).await.unwrap());

    // The worker observes the flag and records the terminal state.
    queue.mark_cancelled(&job.id).await.unwrap();
    let status = queue.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(status.state, JobState::Cancelled);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn duplicate_submission_is_rejected() {
    let queue = local_queue();

    let reference = format!("https://host/dup-{}.mp4", uuid_like());
    queue
        .enqueue(request(&reference), EnqueueOptions::default())
        .await
        .unwrap();
    let err = queue
        .enqueue(request(&reference), EnqueueOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn delayed_job_not_claimable_until_due() {
    let queue = local_queue();

    let mut req = request("https://host/later.mp4");
    req.delay_secs = Some(60);
    let job_id = queue.enqueue(req, EnqueueOptions::default()).await.unwrap();

    let status = queue.get_status(&job_id).await.unwrap().unwrap();
    assert_eq!(status.state, JobState::Delayed);

    let nothing = queue
        .claim("test-worker", Duration::from_millis(500))
        .await
        .unwrap();
    assert!(nothing.is_none());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn metrics_reflect_states() {
    let queue = local_queue();

    queue
        .enqueue(request("https://host/metrics.mp4"), EnqueueOptions::default())
        .await
        .unwrap();

    let metrics = queue.metrics().await.unwrap();
    assert!(metrics.waiting >= 1);
}

fn uuid_like() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    )
}
