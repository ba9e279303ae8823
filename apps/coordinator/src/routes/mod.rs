pub mod health;
pub mod lobbies;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest(
            "/api/v1",
            lobbies::router().merge(health::api_router()),
        )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        health::stats,
        // Lobbies
        lobbies::list_lobbies,
        lobbies::get_lobby,
        lobbies::delete_lobby,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            // Models
            crate::lobby::Lobby,
            crate::lobby::LobbyPlayer,
            crate::lobby::LobbyConfig,
            crate::lobby::LobbyStatus,
            crate::lobby::LobbySettings,
            crate::lobby::LobbySummary,
            // Route request/response types
            health::HealthResponse,
            health::StatsResponse,
            lobbies::ListLobbiesResponse,
            lobbies::DeleteLobbyResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check and live counts"),
        (name = "Lobbies", description = "Lobby browsing and host deletion"),
    )
)]
pub struct ApiDoc;
