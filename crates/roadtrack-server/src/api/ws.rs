//! WebSocket streaming for real-time updates.
//!
//! Observers subscribe to the state-wide broadcast channel; vehicle clients
//! may also push tagged reports over the same socket, which go through the
//! same dispatch as the REST surface. A heartbeat ping runs on an interval;
//! a connection that stays silent past the grace window is closed.

use crate::reroute;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use roadtrack_core::models::ClientMessage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handler for WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.tx.subscribe();

    let config = state.config();
    let ping_interval = Duration::from_secs(config.ws_ping_interval_s.max(1));
    let grace = ping_interval * config.ws_ping_grace_multiplier.max(1);
    let mut ticker = tokio::time::interval(ping_interval);
    // First tick fires immediately; skip it so the grace clock is fair.
    ticker.tick().await;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if last_seen.elapsed() > grace {
                    tracing::debug!("observer missed heartbeat grace window, closing");
                    break;
                }
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        last_seen = Instant::now();
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => {
                                if let Err(err) =
                                    reroute::dispatch_client_message(&state, message).await
                                {
                                    tracing::debug!("rejected stream message: {}", err);
                                }
                            }
                            Err(err) => {
                                tracing::debug!("unparseable stream message: {}", err);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(message) => {
                        let Ok(payload) = serde_json::to_string(&message) else {
                            continue;
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // Drop missed updates; a newer snapshot will arrive soon.
                        continue;
                    }
                    Err(_) => break,
                }
            }
        }
    }
}
