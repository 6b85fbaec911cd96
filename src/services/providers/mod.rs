//! External collaborators of the ranking engine.
//!
//! Each collaborator sits behind a trait so the engine can be driven by the
//! HTTP clients in production and by in-memory fakes in tests:
//!
//! - [`EmbeddingProvider`]: text → fixed-length vector ([`openai::OpenAiEmbedder`],
//!   optionally wrapped in [`cached::CachedEmbedder`])
//! - [`VectorIndex`]: nearest-neighbor query and fetch-by-id per namespace
//!   ([`pinecone::PineconeIndex`])
//! - [`TextGenerator`]: query condensation and assistant replies for
//!   conversational search ([`openai::OpenAiChat`])
use serde::Deserialize;
use std::collections::HashMap;

use crate::{
    error::{AppError, AppResult},
    models::{ChatMessage, Movie},
};

pub mod cached;
pub mod openai;
pub mod pinecone;

/// Partition of a vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Unnamed partition; the content index keeps everything here
    Default,
    Users,
    Movies,
}

impl Namespace {
    /// Wire name; the default namespace is the empty string
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Default => "",
            Namespace::Users => "users",
            Namespace::Movies => "movies",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Default => f.write_str("default"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Metric an index ranks by; decides how raw scores become similarities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMetric {
    Cosine,
    DotProduct,
    Euclidean,
}

impl IndexMetric {
    /// Converts a raw index score into a higher-is-better similarity
    pub fn to_similarity(&self, raw: f64) -> f64 {
        match self {
            IndexMetric::Cosine | IndexMetric::DotProduct => raw,
            IndexMetric::Euclidean => 1.0 / (1.0 + raw.max(0.0)),
        }
    }
}

/// One nearest-neighbor hit, already converted to higher-is-better
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: String,
    pub score: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Converts text into an embedding vector
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbors of `vector`, best first
    async fn query(
        &self,
        namespace: Namespace,
        vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<IndexMatch>>;

    /// Stored vectors by id; ids the index does not know are simply absent
    async fn fetch(
        &self,
        namespace: Namespace,
        ids: &[String],
    ) -> AppResult<HashMap<String, Vec<f32>>>;

    /// Index name for logging and debugging
    fn name(&self) -> &'static str;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Rewrites the latest message into a standalone search query, using the
    /// prior conversation for context
    async fn condense(&self, history: &[ChatMessage], latest: &str) -> AppResult<String>;

    /// Writes the assistant turn describing the results for `query`
    async fn respond(&self, query: &str, movies: &[Movie]) -> AppResult<String>;
}

/// Maps a transport failure onto the retryable upstream error
pub(crate) fn upstream_error(service: &str, err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::UpstreamUnavailable(format!("{} request timed out", service))
    } else {
        AppError::UpstreamUnavailable(format!("{} request failed: {}", service, err))
    }
}

/// Turns a non-success response into an upstream error, keeping the body for logs
pub(crate) async fn check_status(
    service: &str,
    response: reqwest::Response,
) -> AppResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(
        service = service,
        status = %status,
        body = %body,
        "Upstream request failed"
    );
    Err(AppError::UpstreamUnavailable(format!(
        "{} returned status {}",
        service, status
    )))
}
