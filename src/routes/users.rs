use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::AppState,
    error::{AppError, AppResult},
    models::{
        AddRatingRequest, AddRatingsResponse, AddUserRequest, DisplayRating, UpdateUserRequest,
        UserProfile,
    },
    services::{ratings, users},
};

pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<AddUserRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let profile = users::create_user(state.users.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(users::get_user(state.users.as_ref(), &user_id).await?))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(
        users::update_user(state.users.as_ref(), &user_id, request).await?,
    ))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<StatusCode> {
    users::delete_user(state.users.as_ref(), &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// A user's ratings with display fields, most recent first
pub async fn get_ratings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<DisplayRating>>> {
    if state.users.get_user(&user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }
    Ok(Json(state.ratings.display_ratings(&user_id).await?))
}

/// Batch rating upsert; per-item failures are counted, not returned as errors
pub async fn add_ratings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(requests): Json<Vec<AddRatingRequest>>,
) -> AppResult<Json<AddRatingsResponse>> {
    let response = ratings::upsert_ratings(
        state.users.as_ref(),
        state.ratings.as_ref(),
        &user_id,
        requests,
    )
    .await?;
    Ok(Json(response))
}
