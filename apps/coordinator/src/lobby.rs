//! Lobby lifecycle: create, join/leave with host migration, ready state,
//! start, public listing and staleness eviction.
//!
//! Each lobby sits behind its own mutex inside a `DashMap`, so operations on
//! unrelated lobbies never contend. Locks are always taken entity-first, then
//! map shard (for removal). A removed lobby is flagged `closed` under its lock
//! so a caller that fetched the handle before the removal sees `NotFound`
//! rather than mutating a detached lobby.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use woods_common::id::{prefix, prefixed_ulid};

use crate::error::CoordinatorError;
use crate::game::{GameManager, GameState, RosterEntry};

pub const DEFAULT_MAX_PLAYERS: usize = 4;
pub const DEFAULT_WORLD_TYPE: &str = "forest";
pub const DEFAULT_GAME_MODE: &str = "cooperative";
const DEFAULT_HOST_NAME: &str = "Host";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LobbyStatus {
    Waiting,
    Starting,
    InGame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayer {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub is_ready: bool,
}

/// Effective lobby configuration after defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyConfig {
    pub max_players: usize,
    pub world_type: String,
    pub game_mode: String,
    pub is_private: bool,
}

/// Lobby creation request as sent by clients. Every field is optional;
/// missing, zero or empty values fall back to the defaults.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbySettings {
    pub player_name: Option<String>,
    pub max_players: Option<usize>,
    pub world_type: Option<String>,
    pub game_mode: Option<String>,
    pub is_private: Option<bool>,
}

impl LobbySettings {
    fn into_config(self) -> (String, LobbyConfig) {
        let host_name =
            non_empty(self.player_name).unwrap_or_else(|| DEFAULT_HOST_NAME.to_string());
        let config = LobbyConfig {
            max_players: self
                .max_players
                .filter(|n| *n >= 1)
                .unwrap_or(DEFAULT_MAX_PLAYERS),
            world_type: non_empty(self.world_type)
                .unwrap_or_else(|| DEFAULT_WORLD_TYPE.to_string()),
            game_mode: non_empty(self.game_mode)
                .unwrap_or_else(|| DEFAULT_GAME_MODE.to_string()),
            is_private: self.is_private.unwrap_or(false),
        };
        (host_name, config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    pub id: String,
    pub host_player_id: String,
    /// Members in join order.
    pub players: Vec<LobbyPlayer>,
    pub config: LobbyConfig,
    pub status: LobbyStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(skip)]
    closed: bool,
}

impl Lobby {
    pub fn player(&self, player_id: &str) -> Option<&LobbyPlayer> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    pub fn host_name(&self) -> Option<&str> {
        self.player(&self.host_player_id).map(|p| p.name.as_str())
    }

    fn summary(&self) -> LobbySummary {
        LobbySummary {
            id: self.id.clone(),
            host_name: self.host_name().unwrap_or("Unknown").to_string(),
            player_count: self.players.len(),
            max_players: self.config.max_players,
            world_type: self.config.world_type.clone(),
            game_mode: self.config.game_mode.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub id: String,
    pub host_name: String,
    pub player_count: usize,
    pub max_players: usize,
    pub world_type: String,
    pub game_mode: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub created_at: DateTime<Utc>,
}

type LobbyHandle = Arc<Mutex<Lobby>>;

/// Owner of the lobby table.
pub struct LobbyManager {
    lobbies: DashMap<String, LobbyHandle>,
}

impl Default for LobbyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LobbyManager {
    pub fn new() -> Self {
        Self {
            lobbies: DashMap::new(),
        }
    }

    /// Clone the handle out so the shard lock is released before the lobby
    /// lock is taken.
    fn handle(&self, lobby_id: &str) -> Option<LobbyHandle> {
        self.lobbies.get(lobby_id).map(|e| Arc::clone(e.value()))
    }

    fn handles(&self) -> Vec<LobbyHandle> {
        self.lobbies.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Must be called with `lobby` locked and already flagged closed.
    fn detach(&self, lobby_id: &str, handle: &LobbyHandle) {
        self.lobbies
            .remove_if(lobby_id, |_, current| Arc::ptr_eq(current, handle));
    }

    /// Create a lobby with `host_id` as its sole member and host.
    pub fn create(&self, host_id: &str, settings: LobbySettings) -> Lobby {
        let (host_name, config) = settings.into_config();
        let lobby = Lobby {
            id: prefixed_ulid(prefix::LOBBY),
            host_player_id: host_id.to_string(),
            players: vec![LobbyPlayer {
                id: host_id.to_string(),
                name: host_name,
                is_host: true,
                is_ready: false,
            }],
            config,
            status: LobbyStatus::Waiting,
            created_at: Utc::now(),
            game_id: None,
            closed: false,
        };
        self.lobbies
            .insert(lobby.id.clone(), Arc::new(Mutex::new(lobby.clone())));
        tracing::info!(lobby_id = %lobby.id, host_id, "lobby created");
        lobby
    }

    /// Add `session_id` to a waiting lobby. Joining a lobby the session is
    /// already a member of returns the lobby unchanged.
    pub fn join(
        &self,
        lobby_id: &str,
        session_id: &str,
        player_name: Option<String>,
    ) -> Result<Lobby, CoordinatorError> {
        let handle = self.handle(lobby_id).ok_or(CoordinatorError::NotFound)?;
        let mut lobby = handle.lock();
        if lobby.closed {
            return Err(CoordinatorError::NotFound);
        }
        if lobby.player(session_id).is_some() {
            return Ok(lobby.clone());
        }
        if lobby.players.len() >= lobby.config.max_players {
            return Err(CoordinatorError::Full);
        }
        if lobby.status != LobbyStatus::Waiting {
            return Err(CoordinatorError::AlreadyStarted);
        }

        let name = non_empty(player_name)
            .unwrap_or_else(|| format!("Player {}", lobby.players.len() + 1));
        lobby.players.push(LobbyPlayer {
            id: session_id.to_string(),
            name,
            is_host: false,
            is_ready: false,
        });
        Ok(lobby.clone())
    }

    /// Remove a member. Deletes the lobby when it empties; otherwise hands
    /// host to the earliest-joined remaining member if the host left.
    /// Returns false if the lobby or member does not exist.
    pub fn leave(&self, lobby_id: &str, session_id: &str) -> bool {
        let Some(handle) = self.handle(lobby_id) else {
            return false;
        };
        let mut lobby = handle.lock();
        if lobby.closed {
            return false;
        }
        let Some(index) = lobby.players.iter().position(|p| p.id == session_id) else {
            return false;
        };

        let removed = lobby.players.remove(index);
        if lobby.players.is_empty() {
            lobby.closed = true;
            self.detach(lobby_id, &handle);
            tracing::debug!(lobby_id, "last member left, lobby deleted");
        } else if removed.is_host {
            let next = &mut lobby.players[0];
            next.is_host = true;
            let next_id = next.id.clone();
            tracing::debug!(lobby_id, new_host = %next_id, "host migrated");
            lobby.host_player_id = next_id;
        }
        true
    }

    /// Flip a member's ready flag, returning the new value. `None` if either
    /// id is unknown.
    pub fn toggle_ready(&self, lobby_id: &str, session_id: &str) -> Option<bool> {
        let handle = self.handle(lobby_id)?;
        let mut lobby = handle.lock();
        if lobby.closed {
            return None;
        }
        let player = lobby.players.iter_mut().find(|p| p.id == session_id)?;
        player.is_ready = !player.is_ready;
        Some(player.is_ready)
    }

    /// Host-only transition of a fully ready lobby into a game.
    ///
    /// The game is created while the lobby lock is held, so its roster is
    /// exactly the lobby membership at this instant.
    pub fn start_game(
        &self,
        lobby_id: &str,
        requester_id: &str,
        games: &GameManager,
    ) -> Result<GameState, CoordinatorError> {
        let handle = self.handle(lobby_id).ok_or(CoordinatorError::NotFound)?;
        let mut lobby = handle.lock();
        if lobby.closed {
            return Err(CoordinatorError::NotFound);
        }
        if lobby.host_player_id != requester_id {
            return Err(CoordinatorError::Unauthorized);
        }
        if lobby.status != LobbyStatus::Waiting {
            return Err(CoordinatorError::AlreadyStarted);
        }
        if !lobby.players.iter().all(|p| p.is_ready) {
            return Err(CoordinatorError::NotAllReady);
        }

        lobby.status = LobbyStatus::Starting;
        let roster: Vec<RosterEntry> = lobby
            .players
            .iter()
            .map(|p| RosterEntry {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .collect();
        let game = games.create_from_roster(requester_id, &roster, &lobby.config);
        lobby.status = LobbyStatus::InGame;
        lobby.game_id = Some(game.game_id.clone());

        tracing::info!(lobby_id, game_id = %game.game_id, players = roster.len(), "game started");
        Ok(game)
    }

    /// Host-only removal of a lobby. Returns the lobby as it was so the
    /// caller can notify the remaining members.
    pub fn delete(&self, lobby_id: &str, requester_id: &str) -> Result<Lobby, CoordinatorError> {
        let handle = self.handle(lobby_id).ok_or(CoordinatorError::NotFound)?;
        let mut lobby = handle.lock();
        if lobby.closed {
            return Err(CoordinatorError::NotFound);
        }
        if lobby.host_player_id != requester_id {
            return Err(CoordinatorError::Unauthorized);
        }
        lobby.closed = true;
        self.detach(lobby_id, &handle);
        Ok(lobby.clone())
    }

    pub fn get(&self, lobby_id: &str) -> Option<Lobby> {
        let handle = self.handle(lobby_id)?;
        let lobby = handle.lock();
        (!lobby.closed).then(|| lobby.clone())
    }

    /// Current member ids, empty if the lobby is unknown.
    pub fn member_ids(&self, lobby_id: &str) -> Vec<String> {
        self.get_with(lobby_id, Lobby::member_ids).unwrap_or_default()
    }

    fn get_with<T>(&self, lobby_id: &str, f: impl FnOnce(&Lobby) -> T) -> Option<T> {
        let handle = self.handle(lobby_id)?;
        let lobby = handle.lock();
        (!lobby.closed).then(|| f(&*lobby))
    }

    /// Non-private lobbies still waiting for players, newest first.
    pub fn list_public(&self) -> Vec<LobbySummary> {
        let mut summaries: Vec<LobbySummary> = self
            .handles()
            .into_iter()
            .filter_map(|handle| {
                let lobby = handle.lock();
                let listed = !lobby.closed
                    && !lobby.config.is_private
                    && lobby.status == LobbyStatus::Waiting;
                listed.then(|| lobby.summary())
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        summaries
    }

    /// Evict lobbies that are empty or were created more than `max_age`
    /// before `now`, occupied or not. Returns the number evicted.
    pub fn reap(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let mut evicted = 0;
        for handle in self.handles() {
            let mut lobby = handle.lock();
            if lobby.closed {
                continue;
            }
            if lobby.players.is_empty() || now - lobby.created_at > max_age {
                lobby.closed = true;
                let id = lobby.id.clone();
                self.detach(&id, &handle);
                evicted += 1;
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Drop every lobby. Used on shutdown.
    pub fn clear(&self) {
        for handle in self.handles() {
            handle.lock().closed = true;
        }
        self.lobbies.clear();
    }
}
