pub mod config;
pub mod error;
pub mod game;
pub mod gateway;
pub mod lobby;
pub mod reaper;
pub mod routes;

use std::sync::Arc;

use config::Config;
use game::GameManager;
use gateway::fanout::{BroadcastRouter, Transport};
use gateway::registry::SessionRegistry;
use lobby::LobbyManager;

/// Shared application state available to all route handlers and
/// connection tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub lobbies: Arc<LobbyManager>,
    pub games: Arc<GameManager>,
    pub broadcast: Arc<BroadcastRouter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sessions = Arc::new(SessionRegistry::new());
        let lobbies = Arc::new(LobbyManager::new());
        let games = Arc::new(GameManager::new());
        let transport: Arc<dyn Transport> = sessions.clone();
        let broadcast = Arc::new(BroadcastRouter::new(
            lobbies.clone(),
            games.clone(),
            transport,
        ));

        Self {
            config: Arc::new(config),
            sessions,
            lobbies,
            games,
            broadcast,
        }
    }

    /// Drop all sessions, lobbies and games. Closing the session queues ends
    /// every connection writer.
    pub fn shutdown(&self) {
        self.sessions.clear();
        self.lobbies.clear();
        self.games.clear();
    }
}
