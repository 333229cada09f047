//! Session registry and per-job room membership.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Logical namespaces served under `/ws`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// General firehose; receives every job-keyed message
    Videoagent,
    Jobs,
    Progress,
    Frames,
    Scenes,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Videoagent => "videoagent",
            Namespace::Jobs => "jobs",
            Namespace::Progress => "progress",
            Namespace::Frames => "frames",
            Namespace::Scenes => "scenes",
        }
    }

    pub const ALL: [Namespace; 5] = [
        Namespace::Videoagent,
        Namespace::Jobs,
        Namespace::Progress,
        Namespace::Frames,
        Namespace::Scenes,
    ];

    /// Namespace receiving messages for a topic family prefix.
    pub fn for_topic_prefix(prefix: &str) -> Option<Namespace> {
        match prefix {
            "jobs" => Some(Namespace::Jobs),
            "progress" => Some(Namespace::Progress),
            "frames" => Some(Namespace::Frames),
            "scenes" => Some(Namespace::Scenes),
            _ => None,
        }
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "videoagent" => Ok(Namespace::Videoagent),
            "jobs" => Ok(Namespace::Jobs),
            "progress" => Ok(Namespace::Progress),
            "frames" => Ok(Namespace::Frames),
            "scenes" => Ok(Namespace::Scenes),
            other => Err(format!("unknown namespace: {}", other)),
        }
    }
}

/// One connected realtime client.
pub struct Session {
    pub id: String,
    pub namespace: Namespace,
    pub user_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: Mutex<Instant>,
    pub subscribed_jobs: Mutex<HashSet<String>>,
    pub tx: mpsc::Sender<Message>,
}

impl Session {
    pub fn touch(&self) {
        *self.last_activity.lock().expect("session mutex poisoned") = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity
            .lock()
            .expect("session mutex poisoned")
            .elapsed()
    }
}

type RoomKey = (Namespace, String);

/// Mutex-protected session map plus per-room membership sets.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    rooms: RwLock<HashMap<RoomKey, HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly connected session.
    pub fn register(
        &self,
        namespace: Namespace,
        user_id: Option<String>,
        tx: mpsc::Sender<Message>,
    ) -> Arc<Session> {
        let session = Arc::new(Session {
            id: uuid::Uuid::new_v4().to_string(),
            namespace,
            user_id,
            connected_at: Utc::now(),
            last_activity: Mutex::new(Instant::now()),
            subscribed_jobs: Mutex::new(HashSet::new()),
            tx,
        });

        self.sessions
            .write()
            .expect("registry lock poisoned")
            .insert(session.id.clone(), Arc::clone(&session));

        debug!(session_id = %session.id, namespace = namespace.as_str(), "Session registered");
        session
    }

    /// Remove a session and clear its room memberships.
    pub fn unregister(&self, session_id: &str) {
        let session = self
            .sessions
            .write()
            .expect("registry lock poisoned")
            .remove(session_id);

        if let Some(session) = session {
            let jobs: Vec<String> = session
                .subscribed_jobs
                .lock()
                .expect("session mutex poisoned")
                .iter()
                .cloned()
                .collect();

            let mut rooms = self.rooms.write().expect("registry lock poisoned");
            for job_id in jobs {
                let key = (session.namespace, job_id);
                if let Some(members) = rooms.get_mut(&key) {
                    members.remove(session_id);
                    if members.is_empty() {
                        rooms.remove(&key);
                    }
                }
            }
            debug!(session_id = %session_id, "Session unregistered");
        }
    }

    /// Join the session to `job:<jobId>` in its namespace.
    pub fn subscribe(&self, session: &Session, job_id: &str) {
        session
            .subscribed_jobs
            .lock()
            .expect("session mutex poisoned")
            .insert(job_id.to_string());

        self.rooms
            .write()
            .expect("registry lock poisoned")
            .entry((session.namespace, job_id.to_string()))
            .or_default()
            .insert(session.id.clone());
    }

    /// Leave the per-job room.
    pub fn unsubscribe(&self, session: &Session, job_id: &str) {
        session
            .subscribed_jobs
            .lock()
            .expect("session mutex poisoned")
            .remove(job_id);

        let mut rooms = self.rooms.write().expect("registry lock poisoned");
        let key = (session.namespace, job_id.to_string());
        if let Some(members) = rooms.get_mut(&key) {
            members.remove(&session.id);
            if members.is_empty() {
                rooms.remove(&key);
            }
        }
    }

    /// Sessions joined to a job's room in a namespace.
    pub fn room_members(&self, namespace: Namespace, job_id: &str) -> Vec<Arc<Session>> {
        let rooms = self.rooms.read().expect("registry lock poisoned");
        let sessions = self.sessions.read().expect("registry lock poisoned");

        rooms
            .get(&(namespace, job_id.to_string()))
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| sessions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every session connected to a namespace.
    pub fn namespace_sessions(&self, namespace: Namespace) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .expect("registry lock poisoned")
            .values()
            .filter(|s| s.namespace == namespace)
            .cloned()
            .collect()
    }

    /// Live connection count per namespace.
    pub fn namespace_counts(&self) -> HashMap<&'static str, usize> {
        let sessions = self.sessions.read().expect("registry lock poisoned");
        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        for ns in Namespace::ALL {
            counts.insert(ns.as_str(), 0);
        }
        for session in sessions.values() {
            *counts.entry(session.namespace.as_str()).or_default() += 1;
        }
        counts
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().expect("registry lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_session(ns: Namespace) -> (SessionRegistry, Arc<Session>) {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let session = registry.register(ns, Some("u1".to_string()), tx);
        (registry, session)
    }

    #[test]
    fn subscribe_joins_room() {
        let (registry, session) = registry_with_session(Namespace::Jobs);
        registry.subscribe(&session, "job-1");

        let members = registry.room_members(Namespace::Jobs, "job-1");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, session.id);

        // Other namespaces see nothing.
        assert!(registry.room_members(Namespace::Frames, "job-1").is_empty());
    }

    #[test]
    fn unsubscribe_leaves_room() {
        let (registry, session) = registry_with_session(Namespace::Progress);
        registry.subscribe(&session, "job-1");
        registry.unsubscribe(&session, "job-1");
        assert!(registry.room_members(Namespace::Progress, "job-1").is_empty());
    }

    #[test]
    fn unregister_clears_memberships() {
        let (registry, session) = registry_with_session(Namespace::Scenes);
        registry.subscribe(&session, "job-1");
        registry.subscribe(&session, "job-2");

        registry.unregister(&session.id);
        assert!(registry.room_members(Namespace::Scenes, "job-1").is_empty());
        assert!(registry.room_members(Namespace::Scenes, "job-2").is_empty());
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn namespace_counts() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.register(Namespace::Jobs, None, tx.clone());
        registry.register(Namespace::Jobs, None, tx.clone());
        registry.register(Namespace::Videoagent, None, tx);

        let counts = registry.namespace_counts();
        assert_eq!(counts["jobs"], 2);
        assert_eq!(counts["videoagent"], 1);
        assert_eq!(counts["frames"], 0);
    }

    #[test]
    fn namespace_routing_for_topic_prefix() {
        assert_eq!(Namespace::for_topic_prefix("jobs"), Some(Namespace::Jobs));
        assert_eq!(
            Namespace::for_topic_prefix("progress"),
            Some(Namespace::Progress)
        );
        assert_eq!(Namespace::for_topic_prefix("results"), None);
    }
}
