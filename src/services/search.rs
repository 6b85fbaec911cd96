//! Conversational search.
//!
//! Each turn condenses the new message against the session history into a
//! standalone query, ranks movies for it and asks the text generator for a
//! reply. The user message and the reply are appended to the session only
//! after the whole turn succeeds, so a failed turn leaves history untouched.
use std::sync::Arc;

use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{ChatMessage, Movie, Recommendation},
    services::{
        providers::TextGenerator, sessions::SessionStore, with_timeout, RankingEngine,
    },
};

/// Result of one conversational turn
#[derive(Debug, Clone)]
pub struct SearchTurn {
    /// Standalone query the ranking ran against
    pub query: String,
    pub reply: String,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Clone)]
pub struct ChatSearchService {
    engine: RankingEngine,
    sessions: Arc<dyn SessionStore>,
    generator: Arc<dyn TextGenerator>,
}

impl ChatSearchService {
    pub fn new(
        engine: RankingEngine,
        sessions: Arc<dyn SessionStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            engine,
            sessions,
            generator,
        }
    }

    #[instrument(skip(self, message))]
    pub async fn search(
        &self,
        session_id: &str,
        message: &str,
        user_id: Option<&str>,
        k: usize,
    ) -> AppResult<SearchTurn> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::Validation("message cannot be empty".to_string()));
        }

        let timeout = self.engine.config().upstream_timeout;
        let history = with_timeout(timeout, "session store", self.sessions.history(session_id))
            .await?;

        let query = if history.is_empty() {
            message.to_string()
        } else {
            let condensed = with_timeout(
                timeout,
                "text generator",
                self.generator.condense(&history, message),
            )
            .await?;
            let condensed = condensed.trim();
            if condensed.is_empty() {
                tracing::warn!(session_id = %session_id, "Condensed query was blank, using message");
                message.to_string()
            } else {
                condensed.to_string()
            }
        };

        let recommendations = self
            .engine
            .recommend_for_user_and_query(user_id, &query, k, None)
            .await?;

        let movies: Vec<Movie> = recommendations.iter().map(|r| r.movie.clone()).collect();
        let reply = with_timeout(
            timeout,
            "text generator",
            self.generator.respond(&query, &movies),
        )
        .await?;

        with_timeout(
            timeout,
            "session store",
            self.sessions.append(
                session_id,
                vec![ChatMessage::user(message), ChatMessage::assistant(reply.clone())],
            ),
        )
        .await?;

        tracing::info!(
            session_id = %session_id,
            turns = history.len() / 2 + 1,
            returned = recommendations.len(),
            "Search turn completed"
        );

        Ok(SearchTurn {
            query,
            reply,
            recommendations,
        })
    }

    pub async fn history(&self, session_id: &str) -> AppResult<Vec<ChatMessage>> {
        self.sessions.history(session_id).await
    }

    pub async fn clear(&self, session_id: &str) -> AppResult<()> {
        self.sessions.clear(session_id).await
    }
}
