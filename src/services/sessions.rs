//! Conversational search history, keyed by opaque session id.
//!
//! Histories are bounded: each session keeps at most `max_messages` entries
//! (oldest dropped first) and is forgotten after `ttl` without activity.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{error::AppResult, models::ChatMessage};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Messages of a session in append order; empty for unknown or expired ids
    async fn history(&self, session_id: &str) -> AppResult<Vec<ChatMessage>>;

    /// Appends messages as one unit; concurrent appends to the same session
    /// never interleave
    async fn append(&self, session_id: &str, messages: Vec<ChatMessage>) -> AppResult<()>;

    /// Resets a session to empty
    async fn clear(&self, session_id: &str) -> AppResult<()>;
}

struct Session {
    messages: Vec<ChatMessage>,
    last_active: Instant,
}

/// Process-local session store
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    max_messages: usize,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(max_messages: usize, ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_messages: max_messages.max(1),
            ttl,
        }
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        now.duration_since(session.last_active) >= self.ttl
    }

    /// Drops every idle session, returning how many were removed
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        let evicted = before - sessions.len();

        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Runs [`evict_expired`](Self::evict_expired) every `period` until the
    /// returned task is aborted
    pub fn spawn_eviction(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                store.evict_expired().await;
            }
        })
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn history(&self, session_id: &str) -> AppResult<Vec<ChatMessage>> {
        let now = Instant::now();
        let sessions = self.sessions.read().await;

        Ok(match sessions.get(session_id) {
            Some(session) if !self.is_expired(session, now) => session.messages.clone(),
            _ => Vec::new(),
        })
    }

    async fn append(&self, session_id: &str, messages: Vec<ChatMessage>) -> AppResult<()> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session {
                messages: Vec::new(),
                last_active: now,
            });

        if self.is_expired(session, now) {
            session.messages.clear();
        }

        session.messages.extend(messages);
        session.last_active = now;

        let overflow = session.messages.len().saturating_sub(self.max_messages);
        if overflow > 0 {
            session.messages.drain(..overflow);
            tracing::debug!(
                session_id = %session_id,
                dropped = overflow,
                "Session history trimmed"
            );
        }

        Ok(())
    }

    async fn clear(&self, session_id: &str) -> AppResult<()> {
        self.sessions.write().await.remove(session_id);
        tracing::debug!(session_id = %session_id, "Session cleared");
        Ok(())
    }
}
