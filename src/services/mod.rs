use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

pub mod providers;
pub mod ratings;
pub mod recommendations;
pub mod score;
pub mod search;
pub mod sessions;
pub mod users;

pub use recommendations::{RankingConfig, RankingEngine};
pub use search::ChatSearchService;
pub use sessions::{MemorySessionStore, SessionStore};

/// Bounds a collaborator call; an elapsed deadline becomes `UpstreamUnavailable`
pub(crate) async fn with_timeout<T, F>(duration: Duration, what: &str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                call = what,
                timeout_ms = duration.as_millis() as u64,
                "Collaborator call timed out"
            );
            Err(AppError::UpstreamUnavailable(format!(
                "{} timed out after {}ms",
                what,
                duration.as_millis()
            )))
        }
    }
}
