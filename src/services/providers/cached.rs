use std::sync::Arc;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::AppResult,
    services::providers::EmbeddingProvider,
};

/// Embedding provider that serves repeated query texts from Redis.
///
/// Keys include the model name so switching models never returns vectors
/// from a different embedding space.
#[derive(Clone)]
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Cache,
    model: String,
    ttl_secs: u64,
}

impl CachedEmbedder {
    pub fn new(
        inner: Arc<dyn EmbeddingProvider>,
        cache: Cache,
        model: String,
        ttl_secs: u64,
    ) -> Self {
        Self {
            inner,
            cache,
            model,
            ttl_secs,
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        cached!(
            self.cache,
            CacheKey::QueryEmbedding {
                model: self.model.clone(),
                text: text.to_string(),
            },
            self.ttl_secs,
            async move { self.inner.embed(text).await }
        )
    }
}
