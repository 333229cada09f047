//! Gateway statistics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::session::SessionRegistry;

/// Counters tracked since boot.
pub struct GatewayStats {
    started_at: Instant,
    total_sessions: AtomicU64,
    events_by_type: Mutex<HashMap<String, u64>>,
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            total_sessions: AtomicU64::new(0),
            events_by_type: Mutex::new(HashMap::new()),
        }
    }
}

/// Serializable snapshot served at `/stats`.
#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub connections_by_namespace: HashMap<&'static str, usize>,
    pub events_by_type: HashMap<String, u64>,
    pub total_sessions: u64,
    pub uptime_ms: u64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new connection.
    pub fn record_connection(&self, namespace: &str) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("gateway_sessions_total", "namespace" => namespace.to_string())
            .increment(1);
    }

    /// Count one relayed event.
    pub fn record_event(&self, event_type: &str) {
        *self
            .events_by_type
            .lock()
            .expect("stats mutex poisoned")
            .entry(event_type.to_string())
            .or_default() += 1;
        metrics::counter!("gateway_events_relayed", "type" => event_type.to_string()).increment(1);
    }

    /// Snapshot for the stats endpoint.
    pub fn snapshot(&self, registry: &SessionRegistry) -> StatsSnapshot {
        StatsSnapshot {
            connections_by_namespace: registry.namespace_counts(),
            events_by_type: self
                .events_by_type
                .lock()
                .expect("stats mutex poisoned")
                .clone(),
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = GatewayStats::new();
        let registry = SessionRegistry::new();

        stats.record_connection("jobs");
        stats.record_connection("jobs");
        stats.record_event("job_event");
        stats.record_event("job_event");
        stats.record_event("progress_update");

        let snapshot = stats.snapshot(&registry);
        assert_eq!(snapshot.total_sessions, 2);
        assert_eq!(snapshot.events_by_type["job_event"], 2);
        assert_eq!(snapshot.events_by_type["progress_update"], 1);
    }
}
