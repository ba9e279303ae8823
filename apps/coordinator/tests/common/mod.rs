#![allow(dead_code)]

use axum::extract::ws::Utf8Bytes;
use axum::Router;
use tokio::sync::mpsc;

use coordinator::config::Config;
use coordinator::AppState;

/// Build a fresh in-memory AppState with default configuration.
pub fn test_state() -> AppState {
    AppState::new(Config::default())
}

/// Build the full application router wired to a fresh state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = coordinator::routes::router().with_state(state.clone());
    (app, state)
}

/// Register a session directly, bypassing the socket, and return the
/// receiving half of its outbound queue.
pub fn register_session(state: &AppState, session_id: &str) -> mpsc::Receiver<Utf8Bytes> {
    let (tx, rx) = mpsc::channel(64);
    state.sessions.register(session_id.to_string(), tx);
    rx
}

/// Collect every queued message for a session as JSON.
pub fn drain(rx: &mut mpsc::Receiver<Utf8Bytes>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(text) = rx.try_recv() {
        out.push(serde_json::from_str(text.as_str()).expect("server sent invalid JSON"));
    }
    out
}
