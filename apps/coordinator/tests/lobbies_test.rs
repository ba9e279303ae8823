mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use coordinator::gateway::handler::handle_text;
use coordinator::lobby::LobbySettings;
use serde_json::json;

// ---------------------------------------------------------------------------
// GET /health, /api/v1/stats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    resp.assert_json(&json!({ "status": "ok" }));
}

#[tokio::test]
async fn stats_reports_live_counts() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let _rx = common::register_session(&state, "player_1");
    state.lobbies.create("player_1", LobbySettings::default());

    let resp = server.get("/api/v1/stats").await;
    resp.assert_status_ok();
    resp.assert_json(&json!({ "sessions": 1, "lobbies": 1, "games": 0 }));
}

// ---------------------------------------------------------------------------
// GET /api/v1/lobbies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_lobbies_excludes_private_and_started() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let open = state.lobbies.create(
        "host_open",
        LobbySettings {
            player_name: Some("Alice".to_string()),
            world_type: Some("desert".to_string()),
            ..Default::default()
        },
    );
    state.lobbies.create(
        "host_private",
        LobbySettings {
            is_private: Some(true),
            ..Default::default()
        },
    );
    let started = state.lobbies.create("host_started", LobbySettings::default());
    state.lobbies.toggle_ready(&started.id, "host_started");
    state
        .lobbies
        .start_game(&started.id, "host_started", &state.games)
        .unwrap();

    let resp = server.get("/api/v1/lobbies").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();

    assert_eq!(body["count"], 1);
    let lobbies = body["lobbies"].as_array().unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0]["id"], open.id);
    assert_eq!(lobbies[0]["hostName"], "Alice");
    assert_eq!(lobbies[0]["playerCount"], 1);
    assert_eq!(lobbies[0]["maxPlayers"], 4);
    assert_eq!(lobbies[0]["worldType"], "desert");
    assert_eq!(lobbies[0]["gameMode"], "cooperative");
}

#[tokio::test]
async fn list_lobbies_is_newest_first() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let first = state.lobbies.create("host_a", LobbySettings::default());
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = state.lobbies.create("host_b", LobbySettings::default());

    let body: serde_json::Value = server.get("/api/v1/lobbies").await.json();
    let ids: Vec<&str> = body["lobbies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
}

// ---------------------------------------------------------------------------
// GET /api/v1/lobbies/{lobby_id}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_lobby_returns_full_record() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let lobby = state.lobbies.create("host", LobbySettings::default());

    let resp = server.get(&format!("/api/v1/lobbies/{}", lobby.id)).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["id"], lobby.id);
    assert_eq!(body["hostPlayerId"], "host");
    assert_eq!(body["status"], "waiting");
    assert_eq!(body["players"][0]["name"], "Host");
    assert_eq!(body["players"][0]["isHost"], true);
}

#[tokio::test]
async fn get_unknown_lobby_is_404() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/api/v1/lobbies/lobby_missing").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "Lobby not found");
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/lobbies/{lobby_id}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_lobby_by_host_notifies_members() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let mut host_rx = common::register_session(&state, "host");
    let mut guest_rx = common::register_session(&state, "guest");
    handle_text(&state, "host", r#"{"type":"create_lobby"}"#);
    let lobby_id = common::drain(&mut host_rx)[0]["lobby"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    handle_text(
        &state,
        "guest",
        &json!({ "type": "join_lobby", "lobbyId": lobby_id }).to_string(),
    );
    common::drain(&mut host_rx);
    common::drain(&mut guest_rx);

    let resp = server
        .delete(&format!("/api/v1/lobbies/{lobby_id}"))
        .add_query_param("playerId", "host")
        .await;
    resp.assert_status_ok();
    resp.assert_json(&json!({ "deleted": true }));

    assert!(state.lobbies.get(&lobby_id).is_none());
    assert!(state.sessions.current_lobby("guest").is_none());
    assert_eq!(
        common::drain(&mut guest_rx),
        vec![json!({ "type": "lobby_closed", "lobbyId": lobby_id })]
    );
}

#[tokio::test]
async fn delete_lobby_by_non_host_is_forbidden() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let lobby = state.lobbies.create("host", LobbySettings::default());
    state.lobbies.join(&lobby.id, "guest", None).unwrap();

    let resp = server
        .delete(&format!("/api/v1/lobbies/{}", lobby.id))
        .add_query_param("playerId", "guest")
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);
    assert!(state.lobbies.get(&lobby.id).is_some());
}

#[tokio::test]
async fn delete_lobby_requires_player_id() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let lobby = state.lobbies.create("host", LobbySettings::default());

    let resp = server.delete(&format!("/api/v1/lobbies/{}", lobby.id)).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_unknown_lobby_is_404() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .delete("/api/v1/lobbies/lobby_missing")
        .add_query_param("playerId", "host")
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
}
