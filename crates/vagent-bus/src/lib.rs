//! Event bus over the Redis pub/sub fabric.
//!
//! Fan-in from workers, fan-out to realtime subscribers. Delivery is
//! at-least-once per subscriber, FIFO within a topic per publisher,
//! with no replay for late subscribers.

pub mod bus;
pub mod error;
pub mod topic;

pub use bus::{BusConfig, EventBus, EventStream};
pub use error::{BusError, BusResult};
pub use vagent_models::BusMessage;
pub use topic::{
    frames_topic, jobs_topic, pattern_matches, progress_topic, scenes_topic, to_redis_pattern,
    TOPIC_JOBS,
};
