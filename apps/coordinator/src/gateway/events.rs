//! Wire-format messages exchanged over the WebSocket.
//!
//! Every frame is a JSON object tagged by `type`; field names are camelCase.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoordinatorError;
use crate::game::GameState;
use crate::lobby::{Lobby, LobbyPlayer, LobbySettings, LobbySummary};

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Every `type` tag the gateway understands.
pub const CLIENT_MESSAGE_TYPES: &[&str] = &[
    "create_lobby",
    "join_lobby",
    "leave_lobby",
    "ready_toggle",
    "start_game",
    "game_update",
    "resource_collected",
    "chat_message",
    "get_public_lobbies",
    "ping",
];

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateLobby {
        #[serde(default)]
        config: LobbySettings,
    },
    JoinLobby {
        lobby_id: String,
        #[serde(default)]
        player_name: Option<String>,
    },
    LeaveLobby {},
    ReadyToggle {},
    StartGame {},
    GameUpdate {
        player_data: Map<String, Value>,
    },
    ResourceCollected {
        #[serde(default)]
        resource: Value,
        #[serde(default)]
        position: Value,
    },
    ChatMessage {
        #[serde(default)]
        player_name: Option<String>,
        message: String,
    },
    GetPublicLobbies {},
    Ping {},
}

impl ClientMessage {
    /// Parse one text frame.
    ///
    /// Text that is not JSON, or a known `type` with mismatched fields, is an
    /// `InvalidMessage`; JSON without a recognised `type` is an
    /// `UnknownMessageType`.
    pub fn parse(text: &str) -> Result<Self, CoordinatorError> {
        let value: Value =
            serde_json::from_str(text).map_err(|_| CoordinatorError::InvalidMessage)?;
        let known = value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| CLIENT_MESSAGE_TYPES.contains(&kind));
        if !known {
            return Err(CoordinatorError::UnknownMessageType);
        }
        serde_json::from_value(value).map_err(|_| CoordinatorError::InvalidMessage)
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    ConnectionEstablished {
        player_id: String,
        timestamp: i64,
    },
    LobbyCreated {
        lobby: Lobby,
    },
    LobbyJoined {
        lobby: Lobby,
    },
    PlayerJoined {
        player: LobbyPlayer,
    },
    PlayerLeft {
        player_id: String,
    },
    PlayerReadyChanged {
        player_id: String,
        is_ready: bool,
    },
    GameStarting {
        game_id: String,
        game_state: GameState,
    },
    PlayerUpdate {
        player_id: String,
        player_data: Map<String, Value>,
    },
    ResourceCollected {
        player_id: String,
        resource: Value,
        position: Value,
        timestamp: i64,
    },
    ChatMessage {
        player_id: String,
        player_name: Option<String>,
        message: String,
        timestamp: i64,
    },
    PlayerDisconnected {
        player_id: String,
    },
    LobbyClosed {
        lobby_id: String,
    },
    PublicLobbies {
        lobbies: Vec<LobbySummary>,
    },
    Pong {
        timestamp: i64,
    },
    Error {
        error: String,
    },
}

impl ServerMessage {
    pub fn error(err: &CoordinatorError) -> Self {
        Self::Error {
            error: err.to_string(),
        }
    }

    /// Serialize once for delivery to any number of sessions.
    pub fn to_text(&self) -> Option<Utf8Bytes> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json.into()),
            Err(e) => {
                tracing::error!(?e, "failed to serialize server message");
                None
            }
        }
    }
}

/// Server timestamps are milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
