//! WebSocket upgrade handler and per-connection event loop.

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use woods_common::id::{prefix, prefixed_ulid};

use crate::error::CoordinatorError;
use crate::AppState;

use super::events::{now_ms, ServerMessage};
use super::handler::{handle_disconnect, handle_text};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, mut ws_rx) = socket.split();

    let session_id = prefixed_ulid(prefix::PLAYER);
    let (outbound_tx, outbound_rx) = mpsc::channel(state.config.outbound_buffer);
    state.sessions.register(session_id.clone(), outbound_tx);

    tracing::info!(%session_id, "player connected");

    state.broadcast.send_to(
        &session_id,
        &ServerMessage::ConnectionEstablished {
            player_id: session_id.clone(),
            timestamp: now_ms(),
        },
    );

    // The writer owns the sink, so every send to this session goes through
    // the outbound queue in order.
    let mut writer = tokio::spawn(write_outbound(ws_tx, outbound_rx));

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, &session_id, text.as_str());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        state.broadcast.send_to(
                            &session_id,
                            &ServerMessage::error(&CoordinatorError::InvalidMessage),
                        );
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, %session_id, "ws read error");
                        break;
                    }
                }
            }

            _ = &mut writer => {
                tracing::debug!(%session_id, "outbound writer finished");
                break;
            }
        }
    }

    handle_disconnect(&state, &session_id);
    writer.abort();

    tracing::info!(%session_id, "player disconnected");
}

/// Drain the outbound queue into the socket until either side closes.
async fn write_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Utf8Bytes>,
) {
    while let Some(text) = outbound_rx.recv().await {
        if ws_tx.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    let _ = ws_tx.close().await;
}
