use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn api_router() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    ),
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Current table sizes.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub sessions: usize,
    pub lobbies: usize,
    pub games: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/stats",
    tag = "Health",
    responses(
        (status = 200, description = "Live session, lobby and game counts", body = StatsResponse),
    ),
)]
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        sessions: state.sessions.len(),
        lobbies: state.lobbies.len(),
        games: state.games.len(),
    })
}
