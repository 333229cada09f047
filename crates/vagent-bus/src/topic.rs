//! Topic names and subscription pattern matching.
//!
//! Patterns use `:` as the segment separator and `*` as a
//! single-segment wildcard. Redis glob `*` matches across segments, so
//! subscriptions translate the pattern for PSUBSCRIBE and re-check each
//! delivered topic segment-wise before yielding it.

/// Global job lifecycle topic.
pub const TOPIC_JOBS: &str = "jobs";

/// Per-job lifecycle topic.
pub fn jobs_topic(job_id: &str) -> String {
    format!("jobs:{}", job_id)
}

/// Per-job stage progress topic.
pub fn progress_topic(job_id: &str) -> String {
    format!("progress:{}", job_id)
}

/// Per-job frame notification topic.
pub fn frames_topic(job_id: &str) -> String {
    format!("frames:{}", job_id)
}

/// Per-job scene notification topic.
pub fn scenes_topic(job_id: &str) -> String {
    format!("scenes:{}", job_id)
}

/// Segment-wise pattern match: `*` matches exactly one segment.
pub fn pattern_matches(pattern: &str, topic: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.split(':').collect();
    let topic_segs: Vec<&str> = topic.split(':').collect();

    if pattern_segs.len() != topic_segs.len() {
        return false;
    }

    pattern_segs
        .iter()
        .zip(topic_segs.iter())
        .all(|(p, t)| *p == "*" || p == t)
}

/// Translate a bus pattern into the Redis glob handed to PSUBSCRIBE.
///
/// The glob over-matches (its `*` crosses segments); `pattern_matches`
/// narrows delivery back down to the bus contract.
pub fn to_redis_pattern(pattern: &str) -> String {
    pattern.to_string()
}
