/// OpenAI-compatible embedding and chat-completion clients
///
/// Embeddings: POST /v1/embeddings → `data[0].embedding`
/// Chat:       POST /v1/chat/completions → `choices[0].message.content`
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{ChatMessage, Movie},
    services::providers::{check_status, upstream_error, EmbeddingProvider, TextGenerator},
};

const EMBEDDING_SERVICE: &str = "embedding provider";
const CHAT_SERVICE: &str = "text generator";

/// Characters of a movie overview included in the reply prompt
const OVERVIEW_PREVIEW_CHARS: usize = 300;

const CONDENSE_INSTRUCTIONS: &str = "\
You help a user find movies through a series of chat messages. \
Rewrite the CURRENT MESSAGE into one standalone search query that keeps every \
search term from the conversation that still applies. Drop terms that later \
messages contradict and do not invent new ones. Reply with the query only.";

const RESPOND_INSTRUCTIONS: &str = "\
You help a user steer a semantic movie search engine that matches queries \
against genres, keywords, director, actors and plot overview. Start by \
restating the SEARCH QUERY in quotation marks, then offer one to three short \
suggestions that would make the query more specific. Never suggest negations \
or exclusions; the engine cannot handle them.";

pub(crate) fn build_http_client(timeout: Duration) -> AppResult<HttpClient> {
    Ok(HttpClient::builder().timeout(timeout).build()?)
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct OpenAiEmbedder {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            api_key,
            api_url,
            model,
            dimension,
        })
    }

    fn extract_embedding(&self, response: EmbeddingResponse) -> AppResult<Vec<f32>> {
        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                AppError::UpstreamUnavailable("Embedding response contained no data".to_string())
            })?;

        if embedding.len() != self.dimension {
            return Err(AppError::UpstreamUnavailable(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.api_url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                input: text,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| upstream_error(EMBEDDING_SERVICE, e))?;

        let response = check_status(EMBEDDING_SERVICE, response).await?;
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| upstream_error(EMBEDDING_SERVICE, e))?;

        let embedding = self.extract_embedding(body)?;
        tracing::debug!(
            model = %self.model,
            dimension = embedding.len(),
            "Query embedded"
        );
        Ok(embedding)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Clone)]
pub struct OpenAiChat {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            api_key,
            api_url,
            model,
        })
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> AppResult<String> {
        let url = format!("{}/v1/chat/completions", self.api_url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: messages.iter().map(WireMessage::from).collect(),
                temperature: 0.0,
            })
            .send()
            .await
            .map_err(|e| upstream_error(CHAT_SERVICE, e))?;

        let response = check_status(CHAT_SERVICE, response).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| upstream_error(CHAT_SERVICE, e))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| {
                AppError::UpstreamUnavailable("Chat response contained no choices".to_string())
            })
    }
}

/// Renders prior turns as `role: content` lines
fn render_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the result list given to the model as context
fn render_movies(movies: &[Movie]) -> String {
    movies
        .iter()
        .map(|movie| {
            let overview: String = movie.overview.chars().take(OVERVIEW_PREVIEW_CHARS).collect();
            format!(
                "- {} (genres: {}; director: {}): {}",
                movie.title,
                movie.genres.join(", "),
                movie.director,
                overview
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait::async_trait]
impl TextGenerator for OpenAiChat {
    async fn condense(&self, history: &[ChatMessage], latest: &str) -> AppResult<String> {
        let prompt = format!(
            "MESSAGE HISTORY:\n{}\n\nCURRENT MESSAGE:\n{}\n\nSTANDALONE QUERY:",
            render_history(history),
            latest
        );

        self.complete(vec![
            ChatMessage::system(CONDENSE_INSTRUCTIONS),
            ChatMessage::user(prompt),
        ])
        .await
    }

    async fn respond(&self, query: &str, movies: &[Movie]) -> AppResult<String> {
        let prompt = format!(
            "SEARCH QUERY:\n{}\n\nRECOMMENDED MOVIES:\n{}",
            query,
            render_movies(movies)
        );

        self.complete(vec![
            ChatMessage::system(RESPOND_INSTRUCTIONS),
            ChatMessage::user(prompt),
        ])
        .await
    }
}
