//! WebSocket handler for live chat delivery and chat commands.
//!
//! The `/ws/chat` endpoint upgrades an authenticated HTTP connection to a
//! WebSocket. Once connected, the handler:
//!
//! - **Forwards frames:** Subscribes to the caller's channel on the
//!   [`PushHub`](chowline_core::realtime::hub::PushHub) and pushes every
//!   [`ChatFrame`] to the client as a JSON text frame.
//! - **Receives commands:** Parses incoming text frames as [`WsCommand`] and
//!   runs sends, read acknowledgements, and pings through the same service
//!   calls as the REST handlers.
//!
//! Lagged receivers (when the client is too slow to keep up) are handled
//! gracefully: the handler logs a warning and continues receiving.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use chowline_core::realtime::fanout::{fan_out, public_message, push_rejection};
use chowline_types::chat::{MarkRead, SendMessage};
use chowline_types::directory::Principal;
use chowline_types::event::ChatFrame;

use crate::http::extractors::auth::AuthUser;
use crate::state::AppState;

/// Incoming command from a WebSocket client.
///
/// Clients send JSON-encoded text frames matching one of these variants.
/// Unknown or malformed messages are logged and ignored.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    /// Send a chat message.
    Send(SendMessage),
    /// Acknowledge a session's messages.
    MarkRead(MarkRead),
    /// Keep-alive ping. Server responds with `{"type":"pong"}`.
    Ping,
}

/// Upgrade an HTTP request to a WebSocket connection for chat.
///
/// This is mounted at `/ws/chat` in the router.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, principal))
}

/// Core WebSocket connection handler.
///
/// Uses `tokio::select!` to multiplex between frames pushed to this user and
/// incoming WebSocket messages from the client, keeping both directions in
/// a single task.
async fn handle_ws_connection(socket: WebSocket, state: AppState, principal: Principal) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut frame_rx = state.hub.subscribe(&principal.username);
    tracing::info!(username = %principal.username, "Chat WebSocket connected");

    loop {
        tokio::select! {
            // --- Branch 1: Forward pushed frames to the client ---
            frame_result = frame_rx.recv() => {
                match frame_result {
                    Ok(frame) => {
                        if send_frame(&mut ws_sender, &frame).await.is_err() {
                            // Client disconnected
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            username = %principal.username,
                            skipped = n,
                            "WebSocket subscriber lagged, skipping {n} frames"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            // --- Branch 2: Process commands from the client ---
            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        process_command(&text, &mut ws_sender, &state, &principal).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!("WebSocket receive error: {err}");
                        break;
                    }
                    // Ignore binary, ping, pong protocol frames (handled by axum/tungstenite)
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    drop(frame_rx);
    state.hub.prune(&principal.username);
    tracing::info!(username = %principal.username, "Chat WebSocket closed");
}

async fn send_frame(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    frame: &ChatFrame,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(json) => ws_sender.send(Message::Text(json.into())).await,
        Err(err) => {
            tracing::warn!("Failed to serialize ChatFrame: {err}");
            Ok(())
        }
    }
}

/// Parse and process a single command from the WebSocket client.
async fn process_command(
    text: &str,
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    state: &AppState,
    principal: &Principal,
) {
    let cmd: WsCommand = match serde_json::from_str(text) {
        Ok(cmd) => cmd,
        Err(err) => {
            tracing::warn!(
                raw = %text,
                error = %err,
                "Ignoring malformed WebSocket command"
            );
            return;
        }
    };

    match cmd {
        WsCommand::Send(request) => {
            let client_message_id = request.client_message_id.clone();
            match state.chat_service.send(principal, request).await {
                // The sender's own frame arrives through the hub like any other.
                Ok(package) => {
                    fan_out(&state.hub, &package, client_message_id.as_deref()).await;
                }
                Err(err) => {
                    tracing::debug!(username = %principal.username, error = %err, "WebSocket send rejected");
                    push_rejection(
                        &state.hub,
                        &principal.username,
                        &err,
                        client_message_id.as_deref(),
                    )
                    .await;
                }
            }
        }
        WsCommand::MarkRead(request) => {
            if let Err(err) = state.chat_service.mark_read(principal, &request).await {
                let frame = ChatFrame::error(public_message(&err), None);
                if send_frame(ws_sender, &frame).await.is_err() {
                    tracing::debug!("Failed to send error frame (client disconnecting)");
                }
            }
        }
        WsCommand::Ping => {
            if send_frame(ws_sender, &ChatFrame::Pong).await.is_err() {
                tracing::debug!("Failed to send pong (client disconnecting)");
            }
        }
    }
}
