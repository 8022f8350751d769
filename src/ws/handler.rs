use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::User;
use crate::state::AppState;
use crate::ws::{ConnectionHandle, Envelope, OutboundFrame};

/// Close code sent when the connection's credential is missing or rejected
pub const INVALID_TOKEN_CLOSE_CODE: u16 = 4001;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    pub token: Option<String>,
}

/// WebSocket routes
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/api/v1/ws", get(ws_upgrade))
}

/// WebSocket upgrade handler. Authentication happens after the upgrade so the
/// client gets a proper close code instead of a bare HTTP error.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.token))
}

async fn authenticate(state: &AppState, token: Option<&str>) -> Result<User> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))?;

    state.auth_resolver.resolve(token).await
}

/// Owns one connection from upgrade to teardown
async fn handle_socket(mut socket: WebSocket, state: AppState, token: Option<String>) {
    let user = match authenticate(&state, token.as_deref()).await {
        Ok(user) => user,
        Err(e) => {
            tracing::info!(error = %e, "Rejecting WebSocket connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: INVALID_TOKEN_CLOSE_CODE,
                    reason: "Invalid token".into(),
                })))
                .await;
            return;
        }
    };

    let conn_id = Uuid::new_v4();
    tracing::info!(
        conn_id = %conn_id,
        user_id = %user.id,
        username = %user.username,
        "WebSocket connected"
    );

    // Bounded so a stalled client cannot grow memory without limit
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(state.config.ws_outbound_buffer);
    let handle = ConnectionHandle::new(conn_id, user, tx);
    state.registry.register(handle.clone());

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending messages to client
    let writer = handle.clone();
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = ws_sender.send(Message::Text(frame.to_string().into())).await {
                tracing::debug!(conn_id = %writer.conn_id, error = %e, "WebSocket write failed");
                writer.close();
                break;
            }
        }
    });

    // Frames from one connection are handled strictly in arrival order
    loop {
        tokio::select! {
            _ = handle.closed() => {
                tracing::info!(conn_id = %conn_id, "Connection closed by server");
                break;
            }
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    state.dispatcher.dispatch(&handle, text.as_str()).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    let envelope = Envelope::error(
                        "Invalid message format",
                        Some("binary frames are not supported".to_string()),
                    );
                    if handle
                        .deliver(envelope.to_json().into(), state.config.send_timeout())
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pong replies are handled by axum
                    tracing::trace!(conn_id = %conn_id, "Ping received");
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(conn_id = %conn_id, "WebSocket close received");
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    // Cleanup on disconnect, exactly once per connection
    if let Some(departure) = state.registry.unregister(&conn_id) {
        tracing::info!(
            conn_id = %conn_id,
            user_id = %departure.handle.user_id(),
            room_id = ?departure.room_id,
            "WebSocket disconnected, cleaning up"
        );
        state.dispatcher.handle_disconnect(departure).await;
    }

    send_task.abort();
}
