//! Durable job queue over the Redis fabric.
//!
//! At-least-once delivery with priority, delay, retry with exponential
//! backoff, cancellation and per-job state visibility. All mutations go
//! through the fabric's atomic ops; no in-process locking.

pub mod cache;
pub mod error;
pub mod queue;

pub use cache::Cacher;
pub use error::{QueueError, QueueResult};
pub use queue::{JobOutcome, JobQueue, QueueConfig};
