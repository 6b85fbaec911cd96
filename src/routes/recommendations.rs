use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    api::AppState,
    error::{AppError, AppResult},
    models::Recommendation,
};

pub const DEFAULT_K: usize = 10;

#[derive(Debug, Deserialize)]
pub struct RecommendationParams {
    pub user_id: Option<String>,
    pub query: Option<String>,
    pub k: Option<usize>,
    /// Overrides the configured query-score weight for blended rankings
    pub weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TopKParams {
    pub k: Option<usize>,
}

/// Dispatches to the user-only, query-only or blended flow
pub async fn recommend(
    State(state): State<AppState>,
    Query(params): Query<RecommendationParams>,
) -> AppResult<Json<Vec<Recommendation>>> {
    let k = params.k.unwrap_or(DEFAULT_K);
    let user_id = params.user_id.filter(|id| !id.trim().is_empty());

    let recommendations = match (user_id.as_deref(), params.query.as_deref()) {
        (Some(user_id), Some(query)) => {
            state
                .engine
                .recommend_for_user_and_query(Some(user_id), query, k, params.weight)
                .await?
        }
        (Some(user_id), None) => {
            ensure_user_exists(&state, user_id).await?;
            state.engine.recommend_for_user(user_id, k).await?
        }
        (None, Some(query)) => state.engine.recommend_for_query(query, k).await?,
        (None, None) => {
            return Err(AppError::Validation(
                "Either user_id or query must be provided".to_string(),
            ))
        }
    };

    Ok(Json(recommendations))
}

/// Collaborative recommendations for a known user
pub async fn recommend_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<TopKParams>,
) -> AppResult<Json<Vec<Recommendation>>> {
    ensure_user_exists(&state, &user_id).await?;

    let k = params.k.unwrap_or(DEFAULT_K);
    let recommendations = state.engine.recommend_for_user(&user_id, k).await?;
    Ok(Json(recommendations))
}

async fn ensure_user_exists(state: &AppState, user_id: &str) -> AppResult<()> {
    if state.users.get_user(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }
    Ok(())
}
