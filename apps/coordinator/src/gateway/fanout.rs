//! Broadcast router: delivers one message to every member of a lobby or game.
//!
//! Membership is resolved at send time from the owning manager, and each
//! message is serialized once. Delivery goes through a [`Transport`], which
//! the session registry implements over per-connection queues. Targets whose
//! transport is closed or missing are skipped silently; a disconnect racing a
//! broadcast is expected.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;

use crate::game::GameManager;
use crate::lobby::LobbyManager;

use super::events::ServerMessage;

/// Delivery capability the router needs from whatever owns the connections.
pub trait Transport: Send + Sync {
    /// Whether a message sent now could reach the session.
    fn is_open(&self, session_id: &str) -> bool;

    /// Queue `text` for the session. Returns false if it was not accepted.
    fn send(&self, session_id: &str, text: Utf8Bytes) -> bool;
}

/// A broadcast target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group<'a> {
    Lobby(&'a str),
    Game(&'a str),
}

pub struct BroadcastRouter {
    lobbies: Arc<LobbyManager>,
    games: Arc<GameManager>,
    transport: Arc<dyn Transport>,
}

impl BroadcastRouter {
    pub fn new(
        lobbies: Arc<LobbyManager>,
        games: Arc<GameManager>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            lobbies,
            games,
            transport,
        }
    }

    /// Resolve the group's current member ids.
    pub fn members(&self, group: Group<'_>) -> Vec<String> {
        match group {
            Group::Lobby(id) => self.lobbies.member_ids(id),
            Group::Game(id) => self.games.player_ids(id),
        }
    }

    /// Send a message to a single session.
    pub fn send_to(&self, session_id: &str, message: &ServerMessage) -> bool {
        let Some(text) = message.to_text() else {
            return false;
        };
        self.deliver(session_id, text)
    }

    /// Send to every member of `group` except `exclude`. Returns how many
    /// sessions accepted the message.
    pub fn broadcast(
        &self,
        group: Group<'_>,
        message: &ServerMessage,
        exclude: Option<&str>,
    ) -> usize {
        let members = self.members(group);
        self.broadcast_to(&members, message, exclude)
    }

    /// Send to an explicit member list, for groups that no longer exist.
    pub fn broadcast_to(
        &self,
        members: &[String],
        message: &ServerMessage,
        exclude: Option<&str>,
    ) -> usize {
        let Some(text) = message.to_text() else {
            return 0;
        };
        members
            .iter()
            .filter(|id| Some(id.as_str()) != exclude)
            .filter(|id| self.deliver(id, text.clone()))
            .count()
    }

    fn deliver(&self, session_id: &str, text: Utf8Bytes) -> bool {
        if !self.transport.is_open(session_id) {
            tracing::debug!(session_id, "skipping delivery to closed session");
            return false;
        }
        self.transport.send(session_id, text)
    }
}
