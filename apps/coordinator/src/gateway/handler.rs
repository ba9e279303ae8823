//! Inbound message dispatch and disconnect cleanup.
//!
//! Thin layer over the managers: it tracks which lobby/game a session is in,
//! calls the matching manager operation and hands results to the broadcast
//! router. Failures go back to the originating session only, as `error`
//! messages.

use serde_json::{Map, Value};

use crate::error::CoordinatorError;
use crate::game::PROTECTED_PLAYER_FIELDS;
use crate::lobby::LobbySettings;
use crate::AppState;

use super::events::{now_ms, ClientMessage, ServerMessage};
use super::fanout::Group;

/// Handle one text frame from `session_id`.
pub fn handle_text(state: &AppState, session_id: &str, text: &str) {
    let result = ClientMessage::parse(text).and_then(|msg| dispatch(state, session_id, msg));
    if let Err(err) = result {
        tracing::debug!(session_id, %err, "rejected client message");
        state
            .broadcast
            .send_to(session_id, &ServerMessage::error(&err));
    }
}

/// Route a parsed message to its manager operation.
pub fn dispatch(
    state: &AppState,
    session_id: &str,
    msg: ClientMessage,
) -> Result<(), CoordinatorError> {
    match msg {
        ClientMessage::CreateLobby { config } => create_lobby(state, session_id, config),
        ClientMessage::JoinLobby {
            lobby_id,
            player_name,
        } => join_lobby(state, session_id, &lobby_id, player_name),
        ClientMessage::LeaveLobby {} => {
            let lobby_id = state
                .sessions
                .current_lobby(session_id)
                .ok_or(CoordinatorError::NotFound)?;
            leave_lobby(state, session_id, &lobby_id);
            Ok(())
        }
        ClientMessage::ReadyToggle {} => ready_toggle(state, session_id),
        ClientMessage::StartGame {} => start_game(state, session_id),
        ClientMessage::GameUpdate { player_data } => game_update(state, session_id, player_data),
        ClientMessage::ResourceCollected { resource, position } => {
            resource_collected(state, session_id, resource, position);
            Ok(())
        }
        ClientMessage::ChatMessage {
            player_name,
            message,
        } => {
            chat_message(state, session_id, player_name, message);
            Ok(())
        }
        ClientMessage::GetPublicLobbies {} => {
            let lobbies = state.lobbies.list_public();
            state
                .broadcast
                .send_to(session_id, &ServerMessage::PublicLobbies { lobbies });
            Ok(())
        }
        ClientMessage::Ping {} => {
            state
                .broadcast
                .send_to(session_id, &ServerMessage::Pong { timestamp: now_ms() });
            Ok(())
        }
    }
}

fn create_lobby(
    state: &AppState,
    session_id: &str,
    settings: LobbySettings,
) -> Result<(), CoordinatorError> {
    if let Some(previous) = state.sessions.current_lobby(session_id) {
        leave_lobby(state, session_id, &previous);
    }

    let lobby = state.lobbies.create(session_id, settings);
    state.sessions.set_lobby(session_id, Some(lobby.id.clone()));
    state
        .broadcast
        .send_to(session_id, &ServerMessage::LobbyCreated { lobby });
    Ok(())
}

fn join_lobby(
    state: &AppState,
    session_id: &str,
    lobby_id: &str,
    player_name: Option<String>,
) -> Result<(), CoordinatorError> {
    let lobby = state.lobbies.join(lobby_id, session_id, player_name)?;

    if let Some(previous) = state.sessions.current_lobby(session_id) {
        if previous != lobby_id {
            leave_lobby(state, session_id, &previous);
        }
    }
    state.sessions.set_lobby(session_id, Some(lobby_id.to_string()));

    let player = lobby.player(session_id).cloned();
    state
        .broadcast
        .send_to(session_id, &ServerMessage::LobbyJoined { lobby });
    if let Some(player) = player {
        state.broadcast.broadcast(
            Group::Lobby(lobby_id),
            &ServerMessage::PlayerJoined { player },
            Some(session_id),
        );
    }
    Ok(())
}

/// Leave `lobby_id`, clear the session's reference and tell the remaining
/// members.
fn leave_lobby(state: &AppState, session_id: &str, lobby_id: &str) {
    state.sessions.clear_lobby_if(session_id, lobby_id);
    if state.lobbies.leave(lobby_id, session_id) {
        state.broadcast.broadcast(
            Group::Lobby(lobby_id),
            &ServerMessage::PlayerLeft {
                player_id: session_id.to_string(),
            },
            Some(session_id),
        );
    }
}

fn ready_toggle(state: &AppState, session_id: &str) -> Result<(), CoordinatorError> {
    let lobby_id = state
        .sessions
        .current_lobby(session_id)
        .ok_or(CoordinatorError::NotFound)?;
    let is_ready = state
        .lobbies
        .toggle_ready(&lobby_id, session_id)
        .ok_or(CoordinatorError::NotFound)?;

    state.broadcast.broadcast(
        Group::Lobby(&lobby_id),
        &ServerMessage::PlayerReadyChanged {
            player_id: session_id.to_string(),
            is_ready,
        },
        None,
    );
    Ok(())
}

fn start_game(state: &AppState, session_id: &str) -> Result<(), CoordinatorError> {
    let lobby_id = state
        .sessions
        .current_lobby(session_id)
        .ok_or(CoordinatorError::NotFound)?;
    let game = state
        .lobbies
        .start_game(&lobby_id, session_id, &state.games)?;

    let game_id = game.game_id.clone();

    // A member whose session was removed before its game reference landed
    // would never be cleaned up by its own disconnect path.
    let departed: Vec<String> = game
        .players
        .iter()
        .filter(|p| !state.sessions.set_game(&p.id, Some(game_id.clone())))
        .map(|p| p.id.clone())
        .collect();

    state.broadcast.broadcast(
        Group::Lobby(&lobby_id),
        &ServerMessage::GameStarting {
            game_id: game_id.clone(),
            game_state: game,
        },
        None,
    );

    for player_id in departed {
        tracing::debug!(%game_id, %player_id, "member disconnected during start");
        if state.games.remove_player(&game_id, &player_id) {
            state.broadcast.broadcast(
                Group::Game(&game_id),
                &ServerMessage::PlayerDisconnected { player_id },
                None,
            );
        }
    }
    Ok(())
}

fn game_update(
    state: &AppState,
    session_id: &str,
    mut player_data: Map<String, Value>,
) -> Result<(), CoordinatorError> {
    let Some(game_id) = state.sessions.current_game(session_id) else {
        return Ok(());
    };
    if !state
        .games
        .apply_player_update(&game_id, session_id, &player_data)?
    {
        tracing::debug!(session_id, %game_id, "update for unknown game or player ignored");
        return Ok(());
    }

    // Relay only what was applied.
    for key in PROTECTED_PLAYER_FIELDS {
        player_data.remove(*key);
    }
    state.broadcast.broadcast(
        Group::Game(&game_id),
        &ServerMessage::PlayerUpdate {
            player_id: session_id.to_string(),
            player_data,
        },
        Some(session_id),
    );
    Ok(())
}

fn resource_collected(state: &AppState, session_id: &str, resource: Value, position: Value) {
    let Some(game_id) = state.sessions.current_game(session_id) else {
        return;
    };
    if !state.games.touch(&game_id) {
        return;
    }
    state.broadcast.broadcast(
        Group::Game(&game_id),
        &ServerMessage::ResourceCollected {
            player_id: session_id.to_string(),
            resource,
            position,
            timestamp: now_ms(),
        },
        None,
    );
}

fn chat_message(state: &AppState, session_id: &str, player_name: Option<String>, message: String) {
    let chat = ServerMessage::ChatMessage {
        player_id: session_id.to_string(),
        player_name,
        message,
        timestamp: now_ms(),
    };

    if let Some(game_id) = state.sessions.current_game(session_id) {
        if state.games.touch(&game_id) {
            state.broadcast.broadcast(Group::Game(&game_id), &chat, None);
            return;
        }
    }
    if let Some(lobby_id) = state.sessions.current_lobby(session_id) {
        state.broadcast.broadcast(Group::Lobby(&lobby_id), &chat, None);
    }
}

/// Tear down a session after its connection ends.
///
/// Safe to call more than once: only the call that actually removes the
/// session record does any work. Lobby and game cleanup are independent and
/// both always run.
pub fn handle_disconnect(state: &AppState, session_id: &str) {
    let Some(session) = state.sessions.remove(session_id) else {
        return;
    };

    if let Some(lobby_id) = session.current_lobby.as_deref() {
        if state.lobbies.leave(lobby_id, session_id) {
            state.broadcast.broadcast(
                Group::Lobby(lobby_id),
                &ServerMessage::PlayerLeft {
                    player_id: session_id.to_string(),
                },
                None,
            );
        }
    }

    if let Some(game_id) = session.current_game.as_deref() {
        if state.games.remove_player(game_id, session_id) {
            state.broadcast.broadcast(
                Group::Game(game_id),
                &ServerMessage::PlayerDisconnected {
                    player_id: session_id.to_string(),
                },
                None,
            );
        }
    }

    tracing::info!(
        session_id,
        lobby = ?session.current_lobby,
        game = ?session.current_game,
        "session cleaned up"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lobby::LobbyStatus;
    use axum::extract::ws::Utf8Bytes;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn connect(state: &AppState, id: &str) -> mpsc::Receiver<Utf8Bytes> {
        let (tx, rx) = mpsc::channel(64);
        state.sessions.register(id.to_string(), tx);
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<Utf8Bytes>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(text.as_str()).unwrap());
        }
        out
    }

    fn send(state: &AppState, id: &str, value: Value) {
        handle_text(state, id, &value.to_string());
    }

    fn types(messages: &[Value]) -> Vec<&str> {
        messages.iter().map(|m| m["type"].as_str().unwrap()).collect()
    }

    /// Alice hosts a two-player lobby that Bob joins.
    fn two_player_lobby(
        state: &AppState,
    ) -> (String, mpsc::Receiver<Utf8Bytes>, mpsc::Receiver<Utf8Bytes>) {
        let mut alice = connect(state, "alice");
        let mut bob = connect(state, "bob");
        send(
            state,
            "alice",
            json!({ "type": "create_lobby", "config": { "playerName": "Alice", "maxPlayers": 2 } }),
        );
        let created = drain(&mut alice);
        let lobby_id = created[0]["lobby"]["id"].as_str().unwrap().to_string();
        send(
            state,
            "bob",
            json!({ "type": "join_lobby", "lobbyId": lobby_id, "playerName": "Bob" }),
        );
        drain(&mut alice);
        drain(&mut bob);
        (lobby_id, alice, bob)
    }

    #[test]
    fn malformed_and_unknown_messages_get_errors() {
        let state = AppState::new(Config::default());
        let mut rx = connect(&state, "p1");

        handle_text(&state, "p1", "{oops");
        handle_text(&state, "p1", r#"{"type":"fly"}"#);
        let msgs = drain(&mut rx);
        assert_eq!(msgs[0], json!({ "type": "error", "error": "Invalid message format" }));
        assert_eq!(msgs[1], json!({ "type": "error", "error": "Unknown message type" }));
        assert!(state.sessions.contains("p1"));
    }

    #[test]
    fn ping_replies_pong_to_sender() {
        let state = AppState::new(Config::default());
        let mut rx = connect(&state, "p1");
        send(&state, "p1", json!({ "type": "ping" }));
        let msgs = drain(&mut rx);
        assert_eq!(types(&msgs), vec!["pong"]);
        assert!(msgs[0]["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn join_replies_and_notifies_others() {
        let state = AppState::new(Config::default());
        let mut alice = connect(&state, "alice");
        let mut bob = connect(&state, "bob");

        send(&state, "alice", json!({ "type": "create_lobby", "config": {} }));
        let created = drain(&mut alice);
        assert_eq!(types(&created), vec!["lobby_created"]);
        let lobby_id = created[0]["lobby"]["id"].as_str().unwrap().to_string();

        send(&state, "bob", json!({ "type": "join_lobby", "lobbyId": lobby_id }));
        let bob_msgs = drain(&mut bob);
        assert_eq!(types(&bob_msgs), vec!["lobby_joined"]);
        assert_eq!(bob_msgs[0]["lobby"]["players"].as_array().unwrap().len(), 2);

        let alice_msgs = drain(&mut alice);
        assert_eq!(types(&alice_msgs), vec!["player_joined"]);
        assert_eq!(alice_msgs[0]["player"]["name"], "Player 2");
        assert_eq!(state.sessions.current_lobby("bob").as_deref(), Some(lobby_id.as_str()));
    }

    #[test]
    fn join_unknown_lobby_reports_not_found() {
        let state = AppState::new(Config::default());
        let mut rx = connect(&state, "p1");
        send(&state, "p1", json!({ "type": "join_lobby", "lobbyId": "lobby_nope" }));
        assert_eq!(
            drain(&mut rx),
            vec![json!({ "type": "error", "error": "Lobby not found" })]
        );
    }

    #[test]
    fn full_scenario_start_game_broadcasts_to_both() {
        let state = AppState::new(Config::default());
        let (lobby_id, mut alice, mut bob) = two_player_lobby(&state);

        send(&state, "alice", json!({ "type": "ready_toggle" }));
        send(&state, "bob", json!({ "type": "ready_toggle" }));
        let ready = drain(&mut alice);
        assert_eq!(types(&ready), vec!["player_ready_changed", "player_ready_changed"]);
        drain(&mut bob);

        send(&state, "alice", json!({ "type": "start_game" }));
        for rx in [&mut alice, &mut bob] {
            let msgs = drain(rx);
            assert_eq!(types(&msgs), vec!["game_starting"]);
            let players = msgs[0]["gameState"]["players"].as_array().unwrap();
            let names: Vec<&str> = players.iter().map(|p| p["name"].as_str().unwrap()).collect();
            assert_eq!(names, vec!["Alice", "Bob"]);
            for p in players {
                for vital in ["health", "hunger", "thirst", "energy", "warmth"] {
                    assert_eq!(p[vital], 100.0);
                }
                assert_eq!(p["level"], 1);
            }
        }

        let game_id = state.sessions.current_game("bob").unwrap();
        assert_eq!(state.sessions.current_game("alice").as_deref(), Some(game_id.as_str()));
        assert_eq!(state.lobbies.get(&lobby_id).unwrap().status, LobbyStatus::InGame);
    }

    #[test]
    fn start_by_non_host_is_unauthorized() {
        let state = AppState::new(Config::default());
        let (_, mut alice, mut bob) = two_player_lobby(&state);
        send(&state, "alice", json!({ "type": "ready_toggle" }));
        send(&state, "bob", json!({ "type": "ready_toggle" }));
        drain(&mut alice);
        drain(&mut bob);

        send(&state, "bob", json!({ "type": "start_game" }));
        assert_eq!(
            drain(&mut bob),
            vec![json!({ "type": "error", "error": "Not authorized" })]
        );
        assert!(drain(&mut alice).is_empty());
        assert!(state.games.is_empty());
    }

    #[test]
    fn game_update_relays_to_others_only() {
        let state = AppState::new(Config::default());
        let (_, mut alice, mut bob) = two_player_lobby(&state);
        send(&state, "alice", json!({ "type": "ready_toggle" }));
        send(&state, "bob", json!({ "type": "ready_toggle" }));
        send(&state, "alice", json!({ "type": "start_game" }));
        drain(&mut alice);
        drain(&mut bob);

        send(
            &state,
            "bob",
            json!({ "type": "game_update", "playerData": { "health": 80 } }),
        );
        assert!(drain(&mut bob).is_empty());
        let relayed = drain(&mut alice);
        assert_eq!(types(&relayed), vec!["player_update"]);
        assert_eq!(relayed[0]["playerId"], "bob");
        assert_eq!(relayed[0]["playerData"]["health"], 80);

        send(
            &state,
            "bob",
            json!({ "type": "resource_collected", "resource": "wood", "position": { "x": 1, "y": 2 } }),
        );
        assert_eq!(types(&drain(&mut bob)), vec!["resource_collected"]);
        assert_eq!(types(&drain(&mut alice)), vec!["resource_collected"]);
    }

    #[test]
    fn game_update_relay_omits_fields_never_applied() {
        let state = AppState::new(Config::default());
        let (_, mut alice, mut bob) = two_player_lobby(&state);
        send(&state, "alice", json!({ "type": "ready_toggle" }));
        send(&state, "bob", json!({ "type": "ready_toggle" }));
        send(&state, "alice", json!({ "type": "start_game" }));
        let game_id = state.sessions.current_game("bob").unwrap();
        drain(&mut alice);
        drain(&mut bob);

        send(
            &state,
            "bob",
            json!({
                "type": "game_update",
                "playerData": { "id": "hijack", "lastSeen": 0, "level": 3 }
            }),
        );
        let relayed = drain(&mut alice);
        assert_eq!(
            relayed,
            vec![json!({ "type": "player_update", "playerId": "bob", "playerData": { "level": 3 } })]
        );
        assert_eq!(
            state.games.player_ids(&game_id),
            vec!["alice".to_string(), "bob".to_string()]
        );
    }

    #[test]
    fn disconnect_during_start_does_not_leave_player_in_game() {
        let state = AppState::new(Config::default());
        let (lobby_id, mut alice, mut bob) = two_player_lobby(&state);
        send(&state, "alice", json!({ "type": "ready_toggle" }));
        send(&state, "bob", json!({ "type": "ready_toggle" }));
        drain(&mut alice);
        drain(&mut bob);

        // Bob's record is gone but his lobby membership has not been
        // cleaned up yet when the host starts.
        let info = state.sessions.remove("bob").unwrap();
        assert!(info.current_game.is_none());
        send(&state, "alice", json!({ "type": "start_game" }));
        state.lobbies.leave(&lobby_id, "bob");

        let game_id = state.sessions.current_game("alice").unwrap();
        assert_eq!(state.games.player_ids(&game_id), vec!["alice".to_string()]);

        let msgs = drain(&mut alice);
        assert_eq!(types(&msgs), vec!["game_starting", "player_disconnected"]);
        assert_eq!(msgs[1]["playerId"], "bob");
    }

    #[test]
    fn chat_goes_to_lobby_when_not_in_game() {
        let state = AppState::new(Config::default());
        let (_, mut alice, mut bob) = two_player_lobby(&state);

        send(
            &state,
            "bob",
            json!({ "type": "chat_message", "playerName": "Bob", "message": "hi" }),
        );
        for rx in [&mut alice, &mut bob] {
            let msgs = drain(rx);
            assert_eq!(types(&msgs), vec!["chat_message"]);
            assert_eq!(msgs[0]["message"], "hi");
            assert_eq!(msgs[0]["playerId"], "bob");
        }
    }

    #[test]
    fn disconnect_of_host_migrates_and_notifies() {
        let state = AppState::new(Config::default());
        let (lobby_id, _alice, mut bob) = two_player_lobby(&state);

        handle_disconnect(&state, "alice");
        handle_disconnect(&state, "alice");

        let msgs = drain(&mut bob);
        assert_eq!(msgs, vec![json!({ "type": "player_left", "playerId": "alice" })]);
        assert_eq!(state.lobbies.get(&lobby_id).unwrap().host_player_id, "bob");
        assert!(!state.sessions.contains("alice"));
    }

    #[test]
    fn disconnect_of_sole_member_deletes_lobby() {
        let state = AppState::new(Config::default());
        let mut rx = connect(&state, "solo");
        send(&state, "solo", json!({ "type": "create_lobby" }));
        let lobby_id = drain(&mut rx)[0]["lobby"]["id"].as_str().unwrap().to_string();

        handle_disconnect(&state, "solo");
        assert!(state.lobbies.get(&lobby_id).is_none());
    }

    #[test]
    fn disconnect_in_game_notifies_remaining_players() {
        let state = AppState::new(Config::default());
        let (_, mut alice, mut bob) = two_player_lobby(&state);
        send(&state, "alice", json!({ "type": "ready_toggle" }));
        send(&state, "bob", json!({ "type": "ready_toggle" }));
        send(&state, "alice", json!({ "type": "start_game" }));
        let game_id = state.sessions.current_game("alice").unwrap();
        drain(&mut alice);
        drain(&mut bob);

        handle_disconnect(&state, "bob");
        let msgs = drain(&mut alice);
        assert_eq!(
            types(&msgs),
            vec!["player_left", "player_disconnected"]
        );
        assert_eq!(state.games.player_ids(&game_id), vec!["alice".to_string()]);
    }

    #[test]
    fn creating_a_second_lobby_leaves_the_first() {
        let state = AppState::new(Config::default());
        let (first, mut alice, mut bob) = two_player_lobby(&state);

        send(&state, "bob", json!({ "type": "create_lobby" }));
        assert_eq!(types(&drain(&mut alice)), vec!["player_left"]);
        assert_eq!(types(&drain(&mut bob)), vec!["lobby_created"]);
        assert_eq!(state.lobbies.member_ids(&first), vec!["alice".to_string()]);
    }
}
