use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::{
    api::AppState,
    error::{AppError, AppResult},
    models::{ChatMessage, SearchRequest, SearchResponse},
    routes::recommendations::DEFAULT_K,
};

/// Header naming the conversational session
pub const SESSION_ID_HEADER: &str = "session-id";

const MAX_SESSION_ID_LEN: usize = 128;

/// Session id from the header, or a fresh UUIDv4 when absent
fn session_id(headers: &HeaderMap) -> AppResult<String> {
    let Some(value) = headers.get(SESSION_ID_HEADER) else {
        return Ok(Uuid::new_v4().to_string());
    };

    let value = value
        .to_str()
        .map(str::trim)
        .map_err(|_| AppError::Validation("session-id must be ASCII".to_string()))?;

    if value.is_empty()
        || value.len() > MAX_SESSION_ID_LEN
        || !value.bytes().all(|b| b.is_ascii_graphic())
    {
        return Err(AppError::Validation(format!(
            "session-id must be 1 to {} visible ASCII characters",
            MAX_SESSION_ID_LEN
        )));
    }
    Ok(value.to_string())
}

/// One conversational search turn; the session id is echoed in body and header
pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> AppResult<Response> {
    let session_id = session_id(&headers)?;
    let user_id = request.user_id.as_deref().filter(|id| !id.trim().is_empty());
    let k = request.k.unwrap_or(DEFAULT_K);

    let turn = state
        .search
        .search(&session_id, &request.message, user_id, k)
        .await?;

    let header_value = HeaderValue::from_str(&session_id)
        .map_err(|e| AppError::Internal(format!("Invalid session id header: {}", e)))?;
    let body = SearchResponse {
        session_id,
        message: turn.reply,
        recommendations: turn.recommendations,
    };

    let mut response = Json(body).into_response();
    response.headers_mut().insert(SESSION_ID_HEADER, header_value);
    Ok(response)
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    Ok(Json(state.search.history(&session_id).await?))
}

pub async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<StatusCode> {
    state.search.clear(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
