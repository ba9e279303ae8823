//! Active game sessions: seeding from a lobby roster, per-player state
//! merges, player removal and inactivity eviction.
//!
//! Same table layout as the lobby manager: one mutex per game inside a
//! `DashMap`, with a `closed` flag set under the game lock on removal.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use woods_common::id::{prefix, prefixed_ulid};

use crate::error::CoordinatorError;
use crate::lobby::LobbyConfig;

/// Centre of the 3000×3000 world; players spawn around it.
pub const WORLD_CENTER: f64 = 1500.0;
/// Maximum spawn offset from the centre on each axis.
pub const SPAWN_JITTER: f64 = 100.0;
pub const FULL_VITAL: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Live per-player record. Fields the coordinator does not know about are
/// kept in `extra` and relayed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePlayer {
    pub id: String,
    pub name: String,
    pub position: Position,
    pub health: f64,
    pub hunger: f64,
    pub thirst: f64,
    pub energy: f64,
    pub warmth: f64,
    pub level: u32,
    pub inventory: Value,
    pub is_active: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GamePlayer {
    fn spawn(entry: &RosterEntry, rng: &mut impl Rng, now: DateTime<Utc>) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            position: Position {
                x: WORLD_CENTER + rng.gen_range(-SPAWN_JITTER..=SPAWN_JITTER),
                y: WORLD_CENTER + rng.gen_range(-SPAWN_JITTER..=SPAWN_JITTER),
            },
            health: FULL_VITAL,
            hunger: FULL_VITAL,
            thirst: FULL_VITAL,
            energy: FULL_VITAL,
            warmth: FULL_VITAL,
            level: 1,
            inventory: Value::Object(Map::new()),
            is_active: true,
            last_seen: now,
            extra: Map::new(),
        }
    }

    /// Merge `patch` over this record. The id is never overwritten. Fails
    /// without modifying anything if a known field has the wrong shape.
    fn merge(
        &mut self,
        patch: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<(), CoordinatorError> {
        let Ok(Value::Object(mut fields)) = serde_json::to_value(&*self) else {
            return Err(CoordinatorError::InvalidMessage);
        };
        for (key, value) in patch {
            if PROTECTED_PLAYER_FIELDS.contains(&key.as_str()) {
                continue;
            }
            fields.insert(key.clone(), value.clone());
        }
        let mut merged: GamePlayer = serde_json::from_value(Value::Object(fields))
            .map_err(|_| CoordinatorError::InvalidMessage)?;
        merged.last_seen = now;
        *self = merged;
        Ok(())
    }
}

/// Player fields a client update can never overwrite.
pub const PROTECTED_PLAYER_FIELDS: &[&str] = &["id", "lastSeen"];

/// One lobby member handed to [`GameManager::create_from_roster`].
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
}

/// World payload. The coordinator seeds it and otherwise never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldState {
    pub world_type: String,
    pub current_day: u32,
    pub game_time: f64,
    pub resources: Map<String, Value>,
    pub buildings: Map<String, Value>,
    pub events: Vec<Value>,
}

impl WorldState {
    fn new(world_type: &str) -> Self {
        Self {
            world_type: world_type.to_string(),
            current_day: 1,
            game_time: 0.0,
            resources: Map::new(),
            buildings: Map::new(),
            events: Vec::new(),
        }
    }
}

struct Game {
    id: String,
    host_player_id: String,
    players: Vec<GamePlayer>,
    world: WorldState,
    max_players: usize,
    is_active: bool,
    last_update: DateTime<Utc>,
    closed: bool,
}

impl Game {
    fn snapshot(&self) -> GameState {
        GameState {
            game_id: self.id.clone(),
            host_player_id: self.host_player_id.clone(),
            players: self.players.clone(),
            game_state: self.world.clone(),
            max_players: self.max_players,
            is_active: self.is_active,
            last_update: self.last_update,
        }
    }
}

/// Full game snapshot sent to clients when a game starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub game_id: String,
    pub host_player_id: String,
    pub players: Vec<GamePlayer>,
    pub game_state: WorldState,
    pub max_players: usize,
    pub is_active: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_update: DateTime<Utc>,
}

type GameHandle = Arc<Mutex<Game>>;

/// Owner of the game table.
pub struct GameManager {
    games: DashMap<String, GameHandle>,
}

impl Default for GameManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GameManager {
    pub fn new() -> Self {
        Self {
            games: DashMap::new(),
        }
    }

    fn handle(&self, game_id: &str) -> Option<GameHandle> {
        self.games.get(game_id).map(|e| Arc::clone(e.value()))
    }

    fn handles(&self) -> Vec<GameHandle> {
        self.games.iter().map(|e| Arc::clone(e.value())).collect()
    }

    fn detach(&self, game_id: &str, handle: &GameHandle) {
        self.games
            .remove_if(game_id, |_, current| Arc::ptr_eq(current, handle));
    }

    /// Materialize a game with one freshly spawned player per roster entry.
    pub fn create_from_roster(
        &self,
        host_id: &str,
        roster: &[RosterEntry],
        config: &LobbyConfig,
    ) -> GameState {
        let now = Utc::now();
        let mut rng = rand::thread_rng();
        let game = Game {
            id: prefixed_ulid(prefix::GAME),
            host_player_id: host_id.to_string(),
            players: roster
                .iter()
                .map(|entry| GamePlayer::spawn(entry, &mut rng, now))
                .collect(),
            world: WorldState::new(&config.world_type),
            max_players: config.max_players,
            is_active: true,
            last_update: now,
            closed: false,
        };
        let snapshot = game.snapshot();
        self.games
            .insert(game.id.clone(), Arc::new(Mutex::new(game)));
        snapshot
    }

    /// Merge `patch` into the addressed player's record.
    ///
    /// Returns `Ok(false)` when the game or player is unknown (the sender may
    /// already be gone) and `InvalidMessage` when the patch has the wrong
    /// shape for a known field.
    pub fn apply_player_update(
        &self,
        game_id: &str,
        session_id: &str,
        patch: &Map<String, Value>,
    ) -> Result<bool, CoordinatorError> {
        let Some(handle) = self.handle(game_id) else {
            return Ok(false);
        };
        let mut game = handle.lock();
        if game.closed {
            return Ok(false);
        }
        let now = Utc::now();
        let Some(player) = game.players.iter_mut().find(|p| p.id == session_id) else {
            return Ok(false);
        };
        player.merge(patch, now)?;
        game.last_update = now;
        Ok(true)
    }

    /// Mark the game as recently active. Returns false if it no longer exists.
    pub fn touch(&self, game_id: &str) -> bool {
        let Some(handle) = self.handle(game_id) else {
            return false;
        };
        let mut game = handle.lock();
        if game.closed {
            return false;
        }
        game.last_update = Utc::now();
        true
    }

    /// Remove a player. A game left without players is marked inactive and
    /// dropped from the table.
    pub fn remove_player(&self, game_id: &str, session_id: &str) -> bool {
        let Some(handle) = self.handle(game_id) else {
            return false;
        };
        let mut game = handle.lock();
        if game.closed {
            return false;
        }
        let before = game.players.len();
        game.players.retain(|p| p.id != session_id);
        if game.players.len() == before {
            return false;
        }
        if game.players.is_empty() {
            game.is_active = false;
            game.closed = true;
            self.detach(game_id, &handle);
            tracing::debug!(game_id, "last player left, game closed");
        }
        true
    }

    pub fn snapshot(&self, game_id: &str) -> Option<GameState> {
        let handle = self.handle(game_id)?;
        let game = handle.lock();
        (!game.closed).then(|| game.snapshot())
    }

    /// Current player ids, empty if the game is unknown.
    pub fn player_ids(&self, game_id: &str) -> Vec<String> {
        let Some(handle) = self.handle(game_id) else {
            return Vec::new();
        };
        let game = handle.lock();
        if game.closed {
            return Vec::new();
        }
        game.players.iter().map(|p| p.id.clone()).collect()
    }

    /// Evict games whose last activity is more than `max_idle` before `now`,
    /// active or not. Returns the number evicted.
    pub fn reap(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let mut evicted = 0;
        for handle in self.handles() {
            let mut game = handle.lock();
            if game.closed || now - game.last_update <= max_idle {
                continue;
            }
            game.is_active = false;
            game.closed = true;
            let id = game.id.clone();
            self.detach(&id, &handle);
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Drop every game. Used on shutdown.
    pub fn clear(&self) {
        for handle in self.handles() {
            handle.lock().closed = true;
        }
        self.games.clear();
    }
}
