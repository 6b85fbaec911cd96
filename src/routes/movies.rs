use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::AppState,
    error::{AppError, AppResult},
    models::Movie,
};

/// Creates or re-ingests a catalog entry keyed by `tmdb_id`
pub async fn upsert_movie(
    State(state): State<AppState>,
    Json(movie): Json<Movie>,
) -> AppResult<Json<Movie>> {
    if movie.tmdb_id.trim().is_empty() || movie.title.trim().is_empty() {
        return Err(AppError::Validation(
            "tmdb_id and title cannot be empty".to_string(),
        ));
    }

    state.movies.upsert_movie(&movie).await?;
    tracing::info!(tmdb_id = %movie.tmdb_id, "Movie upserted");
    Ok(Json(movie))
}

pub async fn get_movie(
    State(state): State<AppState>,
    Path(tmdb_id): Path<String>,
) -> AppResult<Json<Movie>> {
    state
        .movies
        .get_movie(&tmdb_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Movie {} not found", tmdb_id)))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    Path(tmdb_id): Path<String>,
) -> AppResult<StatusCode> {
    if !state.movies.delete_movie(&tmdb_id).await? {
        return Err(AppError::NotFound(format!("Movie {} not found", tmdb_id)));
    }
    tracing::info!(tmdb_id = %tmdb_id, "Movie deleted");
    Ok(StatusCode::NO_CONTENT)
}
