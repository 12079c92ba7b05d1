//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hub::{ConnectionId, Outbound};
use crate::protocol;
use crate::server::{BroadcastServer, INVALID_COMMAND};

/// WebSocket upgrade handler
///
/// This is the entry point for WebSocket connections.
/// It upgrades the HTTP connection to WebSocket and starts message handling.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(server): State<Arc<BroadcastServer>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, server))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, server: Arc<BroadcastServer>) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending messages to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let connection_id = match server.on_connection_opened(tx) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "Refusing WebSocket connection");
            if let Ok(encoded) = protocol::Message::error(e.to_string()).encode() {
                let _ = sender.send(Message::Binary(encoded)).await;
            }
            let _ = sender
                .send(close_message(&server.config().close_reason))
                .await;
            return;
        }
    };

    // Task to forward queued messages to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Binary(data) => {
                    if sender.send(Message::Binary(data)).await.is_err() {
                        tracing::debug!(
                            connection_id = %connection_id,
                            "WebSocket send failed, closing connection"
                        );
                        break;
                    }
                }
                Outbound::Close { reason } => {
                    let _ = sender.send(close_message(&reason)).await;
                    break;
                }
            }
        }
    });

    let server_for_recv = Arc::clone(&server);

    // Task to receive commands from the WebSocket
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&server_for_recv, connection_id, msg) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    server.on_connection_closed(connection_id);
}

fn close_message(reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: reason.to_string().into(),
    }))
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
fn handle_ws_message(
    server: &BroadcastServer,
    connection_id: ConnectionId,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            server.on_message(connection_id, &text);
            true
        }
        Message::Binary(data) => {
            match std::str::from_utf8(&data) {
                Ok(text) => server.on_message(connection_id, text),
                Err(_) => server.send_error(connection_id, INVALID_COMMAND),
            }
            true
        }
        Message::Ping(_) => {
            // Axum handles ping/pong automatically
            true
        }
        Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}
