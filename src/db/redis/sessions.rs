use redis::AsyncCommands;
use redis::Client;
use std::time::Duration;

use crate::{
    db::redis::CacheKey,
    error::{AppError, AppResult},
    models::ChatMessage,
    services::sessions::SessionStore,
};

/// Session store backed by one Redis list per session.
///
/// Appends run as a single MULTI/EXEC of RPUSH, LTRIM and EXPIRE, so
/// concurrent writers to a session never interleave and the list never
/// exceeds `max_messages`. Idle sessions expire through the key TTL.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis_client: Client,
    max_messages: usize,
    ttl: Duration,
}

impl RedisSessionStore {
    pub fn new(redis_client: Client, max_messages: usize, ttl: Duration) -> Self {
        Self {
            redis_client,
            max_messages: max_messages.max(1),
            ttl,
        }
    }

    fn key(session_id: &str) -> String {
        CacheKey::SessionHistory(session_id.to_string()).to_string()
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn history(&self, session_id: &str) -> AppResult<Vec<ChatMessage>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let entries: Vec<String> = conn.lrange(Self::key(session_id), 0, -1).await?;

        let mut messages = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_str::<ChatMessage>(&entry) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "Skipping undecodable session message"
                    );
                }
            }
        }
        Ok(messages)
    }

    async fn append(&self, session_id: &str, messages: Vec<ChatMessage>) -> AppResult<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let encoded = messages
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Session serialization error: {}", e)))?;

        let key = Self::key(session_id);
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .rpush(&key, encoded)
            .ignore()
            .ltrim(&key, -(self.max_messages as isize), -1)
            .ignore()
            .expire(&key, self.ttl.as_secs() as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn clear(&self, session_id: &str) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(Self::key(session_id)).await?;
        tracing::debug!(session_id = %session_id, "Session cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::redis::create_redis_client;

    fn store(max_messages: usize) -> RedisSessionStore {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = create_redis_client(&redis_url).unwrap();
        RedisSessionStore::new(client, max_messages, Duration::from_secs(60))
    }

    #[test]
    fn test_session_key() {
        assert_eq!(RedisSessionStore::key("abc"), "session:abc");
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_append_trim_and_clear() {
        let store = store(3);
        let session_id = uuid::Uuid::new_v4().to_string();

        store
            .append(
                &session_id,
                vec![ChatMessage::user("q1"), ChatMessage::assistant("a1")],
            )
            .await
            .unwrap();
        store
            .append(
                &session_id,
                vec![ChatMessage::user("q2"), ChatMessage::assistant("a2")],
            )
            .await
            .unwrap();

        let history = store.history(&session_id).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a1", "q2", "a2"]);

        store.clear(&session_id).await.unwrap();
        assert!(store.history(&session_id).await.unwrap().is_empty());
    }
}
