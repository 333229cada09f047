//! Live-stream data plane.
//!
//! A consumer-group reader over per-stream append logs feeds a
//! micro-batcher; batch workers run GPU inference per record and emit
//! three-tier progressive results (partial -> refined -> final).
//! Live-stream loss is preferred to blocking the consumer: full
//! channels drop the newest work and count it.

pub mod batcher;
pub mod consumer;
pub mod error;
pub mod progressive;

pub use batcher::{BatchProcessor, BatcherConfig, FrameBatcher, PendingRecord};
pub use consumer::{StreamConsumer, StreamConsumerConfig};
pub use error::{StreamError, StreamResult as StreamOpResult};
pub use progressive::{BusSink, ProgressiveConfig, ProgressiveResults, ResultSink};
