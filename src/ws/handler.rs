//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::http::identity::{verify_jwt, AuthError, Identity};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::gateway::Session;
use crate::ws::protocol::ServerMsg;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify the token before upgrading
    let verified = query
        .token
        .as_deref()
        .ok_or(AuthError::MissingToken)
        .and_then(|token| verify_jwt(token, &state.config.auth_jwt_secret));

    match verified {
        Ok(identity) => {
            info!(user_id = %identity.user_id, "WebSocket upgrade for authenticated user");
            ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            e.into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Identity, state: AppState) {
    let session = Session {
        user_id: identity.user_id,
        display_name: identity.display_name,
    };
    let user_id = session.user_id;
    info!(user_id = %user_id, name = %session.display_name, "New WebSocket connection");

    let (ws_sink, mut ws_stream) = socket.split();
    let outbound = state.hub.connect(user_id);
    let writer_handle = tokio::spawn(write_loop(user_id, ws_sink, outbound));

    state.gateway.on_connect(&session);

    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);

    // Reader loop: WebSocket -> gateway
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(user_id = %user_id, "Rate limited input message");
                    continue;
                }
                state.gateway.handle_text(&session, &text);
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();

    // Queue and room cleanup only once the identity has no sockets left
    if state.hub.disconnect(user_id) {
        state.gateway.on_disconnect(user_id);
    }

    info!(user_id = %user_id, "WebSocket connection closed");
}

/// Drain the identity's outbound stream into this socket
async fn write_loop(
    user_id: uuid::Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound: broadcast::Receiver<ServerMsg>,
) {
    loop {
        match outbound.recv().await {
            Ok(msg) => {
                if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                    debug!(user_id = %user_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                // Continue - don't disconnect for lag
                warn!(user_id = %user_id, lagged_count = n, "Client lagged, skipped {} messages", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(user_id = %user_id, "Outbound channel closed");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
