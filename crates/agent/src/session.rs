//! Conversation sessions keyed by channel identity.
//!
//! A session pins one customer to one completion-service thread plus the
//! profile that was resolved when the thread was opened. Entries idle out;
//! the server sweeps them on a timer so a long-running process does not
//! accumulate a thread per phone number forever.

use std::collections::HashMap;

use mostrador_core::domain::customer::CustomerProfile;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct Session {
    pub thread_id: String,
    pub profile: Option<CustomerProfile>,
    pub created_at: Instant,
}

impl Session {
    pub fn new(thread_id: impl Into<String>, profile: Option<CustomerProfile>) -> Self {
        Self { thread_id: thread_id.into(), profile, created_at: Instant::now() }
    }
}

struct Entry {
    session: Session,
    last_seen: Instant,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Entry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the session for `identity`, counting the lookup as
    /// activity.
    pub async fn get(&self, identity: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(identity).map(|entry| {
            entry.last_seen = Instant::now();
            entry.session.clone()
        })
    }

    /// Stores `session` unless another task got there first; the stored
    /// session wins either way. Callers compare thread ids to learn whether
    /// theirs was kept.
    pub async fn insert_if_absent(&self, identity: &str, session: Session) -> Session {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .entry(identity.to_string())
            .or_insert_with(|| Entry { session, last_seen: Instant::now() });
        entry.session.clone()
    }

    /// Drops every session idle for at least `max_idle` and returns how
    /// many were evicted.
    pub async fn evict_idle(&self, max_idle: std::time::Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() < max_idle);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(event_name = "session.evicted", count = evicted);
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn missing_sessions_are_none() {
        let registry = SessionRegistry::new();
        assert!(registry.get("5491144445555").await.is_none());
    }

    #[tokio::test]
    async fn first_insert_wins() {
        let registry = SessionRegistry::new();

        let kept = registry
            .insert_if_absent("5491144445555", Session::new("thread_a", None))
            .await;
        assert_eq!(kept.thread_id, "thread_a");

        let raced = registry
            .insert_if_absent("5491144445555", Session::new("thread_b", None))
            .await;
        assert_eq!(raced.thread_id, "thread_a");
        assert_eq!(raced.created_at, kept.created_at);

        let found = registry.get("5491144445555").await.expect("session");
        assert_eq!(found.thread_id, "thread_a");
    }

    #[tokio::test]
    async fn eviction_only_touches_idle_sessions() {
        let registry = SessionRegistry::new();
        registry.insert_if_absent("one", Session::new("thread_1", None)).await;
        registry.insert_if_absent("two", Session::new("thread_2", None)).await;

        assert_eq!(registry.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.len().await, 2);

        assert_eq!(registry.evict_idle(Duration::ZERO).await, 2);
        assert!(registry.is_empty().await);
    }
}
