//! Session registry: one record per live connection.
//!
//! A session holds the sending half of its connection's outbound queue and
//! the ids of the lobby and game it currently occupies. The socket itself is
//! owned by the connection task; when that task ends the queue closes and
//! `is_open` turns false even if the record has not been removed yet.

use axum::extract::ws::Utf8Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::fanout::Transport;

/// Per-session state.
pub struct SessionEntry {
    pub session_id: String,
    pub current_lobby: Option<String>,
    pub current_game: Option<String>,
    outbound: mpsc::Sender<Utf8Bytes>,
}

/// Lobby/game references of a session, returned when it is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub current_lobby: Option<String>,
    pub current_game: Option<String>,
}

impl SessionEntry {
    fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            current_lobby: self.current_lobby.clone(),
            current_game: self.current_game.clone(),
        }
    }
}

/// Shared registry of all connected sessions.
///
/// Uses `DashMap` for shard-level concurrency and `parking_lot::Mutex` per
/// entry for non-poisoning, fast locking.
pub struct SessionRegistry {
    sessions: DashMap<String, Mutex<SessionEntry>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a newly accepted connection.
    pub fn register(&self, session_id: String, outbound: mpsc::Sender<Utf8Bytes>) {
        let entry = SessionEntry {
            session_id: session_id.clone(),
            current_lobby: None,
            current_game: None,
            outbound,
        };
        self.sessions.insert(session_id, Mutex::new(entry));
    }

    /// Take the session out of the registry. Only the first caller for a
    /// given id gets `Some`, which makes disconnect cleanup run once.
    pub fn remove(&self, session_id: &str) -> Option<SessionInfo> {
        let (_, entry) = self.sessions.remove(session_id)?;
        let info = entry.into_inner().info();
        Some(info)
    }

    pub fn get(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.get(session_id).map(|e| e.lock().info())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn current_lobby(&self, session_id: &str) -> Option<String> {
        self.sessions
            .get(session_id)
            .and_then(|e| e.lock().current_lobby.clone())
    }

    pub fn current_game(&self, session_id: &str) -> Option<String> {
        self.sessions
            .get(session_id)
            .and_then(|e| e.lock().current_game.clone())
    }

    pub fn set_lobby(&self, session_id: &str, lobby_id: Option<String>) {
        if let Some(entry) = self.sessions.get(session_id) {
            entry.lock().current_lobby = lobby_id;
        }
    }

    /// Returns false if the session is gone, in which case nothing is
    /// recorded and the caller owns any cleanup for it.
    pub fn set_game(&self, session_id: &str, game_id: Option<String>) -> bool {
        let Some(entry) = self.sessions.get(session_id) else {
            return false;
        };
        entry.lock().current_game = game_id;
        true
    }

    /// Clear the session's lobby reference only if it still points at
    /// `lobby_id`.
    pub fn clear_lobby_if(&self, session_id: &str, lobby_id: &str) {
        if let Some(entry) = self.sessions.get(session_id) {
            let mut e = entry.lock();
            if e.current_lobby.as_deref() == Some(lobby_id) {
                e.current_lobby = None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session. Their outbound queues close, which ends the
    /// connection writer tasks.
    pub fn clear(&self) {
        self.sessions.clear();
    }
}

impl Transport for SessionRegistry {
    fn is_open(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|e| !e.lock().outbound.is_closed())
    }

    fn send(&self, session_id: &str, text: Utf8Bytes) -> bool {
        let Some(entry) = self.sessions.get(session_id) else {
            return false;
        };
        let outbound = entry.lock().outbound.clone();
        drop(entry);

        match outbound.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session_id, "outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
