use serde::Deserialize;
use std::time::Duration;

use crate::services::providers::IndexMetric;

/// Where conversational search history is kept
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    Redis,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL database connection URL. When unset the in-memory store is used.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection URL (embedding cache and, optionally, sessions)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_session_backend")]
    pub session_backend: SessionBackend,

    /// OpenAI API key (embeddings and chat completions)
    pub openai_api_key: String,

    #[serde(default = "default_openai_api_url")]
    pub openai_api_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Expected length of every embedding returned by the provider
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Pinecone API key, shared by both indexes
    pub pinecone_api_key: String,

    /// Host URL of the movie content index
    pub content_index_url: String,

    /// Host URL of the collaborative (users/movies) index
    pub collaborative_index_url: String,

    #[serde(default = "default_metric")]
    pub content_index_metric: IndexMetric,

    #[serde(default = "default_metric")]
    pub collaborative_index_metric: IndexMetric,

    /// Weight of the query-match score in blended recommendations
    #[serde(default = "default_query_score_weight")]
    pub query_score_weight: f64,

    /// Ratings at or above this value count as "liked"
    #[serde(default = "default_liked_rating_threshold")]
    pub liked_rating_threshold: f64,

    /// Neighbors fetched per seed when building a candidate pool
    #[serde(default = "default_candidate_pool_size")]
    pub candidate_pool_size: usize,

    /// Upper bound on `k` accepted from clients
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    /// Bound on every embedding, index, store and chat call
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// Messages retained per conversational session
    #[serde(default = "default_session_max_messages")]
    pub session_max_messages: usize,

    /// Idle time after which a session's history is dropped
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_embedding_cache_ttl_secs")]
    pub embedding_cache_ttl_secs: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_session_backend() -> SessionBackend {
    SessionBackend::Memory
}

fn default_openai_api_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_metric() -> IndexMetric {
    IndexMetric::Cosine
}

fn default_query_score_weight() -> f64 {
    0.8
}

fn default_liked_rating_threshold() -> f64 {
    3.5
}

fn default_candidate_pool_size() -> usize {
    50
}

fn default_max_k() -> usize {
    100
}

fn default_upstream_timeout_ms() -> u64 {
    10_000
}

fn default_session_max_messages() -> usize {
    40
}

fn default_session_ttl_secs() -> u64 {
    86_400
}

fn default_embedding_cache_ttl_secs() -> u64 {
    604_800 // 1 week
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the ranking engine cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.query_score_weight > 0.0 && self.query_score_weight < 1.0) {
            anyhow::bail!(
                "QUERY_SCORE_WEIGHT must be strictly between 0 and 1, got {}",
                self.query_score_weight
            );
        }
        if !(1.0..=5.0).contains(&self.liked_rating_threshold) {
            anyhow::bail!(
                "LIKED_RATING_THRESHOLD must be within [1, 5], got {}",
                self.liked_rating_threshold
            );
        }
        if self.candidate_pool_size == 0 || self.max_k == 0 {
            anyhow::bail!("CANDIDATE_POOL_SIZE and MAX_K must be positive");
        }
        if self.upstream_timeout_ms == 0 {
            anyhow::bail!("UPSTREAM_TIMEOUT_MS must be positive");
        }
        if self.session_max_messages == 0 {
            anyhow::bail!("SESSION_MAX_MESSAGES must be positive");
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}
