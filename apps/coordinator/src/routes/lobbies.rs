//! Read-only lobby browsing plus host-initiated lobby deletion.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::events::ServerMessage;
use crate::lobby::{Lobby, LobbySummary};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lobbies", get(list_lobbies))
        .route("/lobbies/{lobby_id}", get(get_lobby).delete(delete_lobby))
}

// ---------------------------------------------------------------------------
// GET /api/v1/lobbies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ListLobbiesResponse {
    pub lobbies: Vec<LobbySummary>,
    pub count: usize,
}

/// Public lobbies still accepting players, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/lobbies",
    tag = "Lobbies",
    responses(
        (status = 200, description = "Joinable public lobbies", body = ListLobbiesResponse),
    ),
)]
pub async fn list_lobbies(State(state): State<AppState>) -> Json<ListLobbiesResponse> {
    let lobbies = state.lobbies.list_public();
    Json(ListLobbiesResponse {
        count: lobbies.len(),
        lobbies,
    })
}

// ---------------------------------------------------------------------------
// GET /api/v1/lobbies/{lobby_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/lobbies/{lobby_id}",
    tag = "Lobbies",
    params(
        ("lobby_id" = String, Path, description = "Lobby ID"),
    ),
    responses(
        (status = 200, description = "Lobby details", body = Lobby),
        (status = 404, description = "Lobby not found", body = ApiErrorBody),
    ),
)]
pub async fn get_lobby(
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
) -> Result<Json<Lobby>, ApiError> {
    state
        .lobbies
        .get(&lobby_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Lobby not found"))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/lobbies/{lobby_id}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLobbyParams {
    pub player_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteLobbyResponse {
    pub deleted: bool,
}

#[utoipa::path(
    delete,
    path = "/api/v1/lobbies/{lobby_id}",
    tag = "Lobbies",
    params(
        ("lobby_id" = String, Path, description = "Lobby ID"),
        ("playerId" = String, Query, description = "Requesting player; must be the host"),
    ),
    responses(
        (status = 200, description = "Lobby deleted", body = DeleteLobbyResponse),
        (status = 400, description = "Missing playerId", body = ApiErrorBody),
        (status = 403, description = "Requester is not the host", body = ApiErrorBody),
        (status = 404, description = "Lobby not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_lobby(
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
    Query(params): Query<DeleteLobbyParams>,
) -> Result<Json<DeleteLobbyResponse>, ApiError> {
    let player_id = params
        .player_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("playerId is required"))?;

    let lobby = state.lobbies.delete(&lobby_id, &player_id)?;
    let members = lobby.member_ids();
    for member in &members {
        state.sessions.clear_lobby_if(member, &lobby_id);
    }
    state.broadcast.broadcast_to(
        &members,
        &ServerMessage::LobbyClosed {
            lobby_id: lobby_id.clone(),
        },
        None,
    );

    tracing::info!(%lobby_id, host = %player_id, members = members.len(), "lobby deleted");

    Ok(Json(DeleteLobbyResponse { deleted: true }))
}
