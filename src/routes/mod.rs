use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    api::AppState,
    middleware::{make_span_with_request_id, request_id_middleware},
};

pub mod movies;
pub mod recommendations;
pub mod search;
pub mod users;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(users::create_user))
        .route(
            "/users/:user_id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/users/:user_id/ratings",
            get(users::get_ratings).post(users::add_ratings),
        )
        .route(
            "/users/:user_id/recommendations",
            get(recommendations::recommend_for_user),
        )
        .route("/movies", post(movies::upsert_movie))
        .route(
            "/movies/:tmdb_id",
            get(movies::get_movie).delete(movies::delete_movie),
        )
        .route("/recommendations", get(recommendations::recommend))
        .route("/search", post(search::search))
        .route(
            "/search/sessions/:session_id",
            get(search::get_session).delete(search::clear_session),
        )
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
