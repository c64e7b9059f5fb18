//! WebSocket endpoint for the review channel.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::review::coordinator::ReviewCoordinator;
use crate::review::protocol::{ClientMessage, ErrorData, ServerMessage, StatusData};

/// Build the review WebSocket router.
pub fn review_routes(coordinator: Arc<ReviewCoordinator>) -> Router {
    Router::new()
        .route("/ws/drafts", get(ws_handler))
        .with_state(coordinator)
}

#[derive(Deserialize)]
struct WsParams {
    user_id: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(coordinator): State<Arc<ReviewCoordinator>>,
) -> impl IntoResponse {
    info!(user_id = %params.user_id, "Review channel connecting");
    ws.on_upgrade(|socket| handle_socket(socket, params.user_id, coordinator))
}

async fn handle_socket(mut socket: WebSocket, user_id: String, coordinator: Arc<ReviewCoordinator>) {
    let registry = Arc::clone(coordinator.registry());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let token = registry.connect(&user_id, tx).await;

    // Probe the transport right away so a dead socket is caught early.
    registry.send(&user_id, ServerMessage::ConnectionTest).await;

    loop {
        tokio::select! {
            // Pump registry-published messages out to the party.
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if send_server_message(&mut socket, &msg).await.is_err() {
                            debug!(user_id, "Party disconnected during send");
                            break;
                        }
                    }
                    // Sender dropped: this channel was replaced.
                    None => {
                        debug!(user_id, "Transport replaced, closing old socket");
                        break;
                    }
                }
            }

            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) =
                            handle_client_message(&text, &user_id, &coordinator).await
                        {
                            if send_server_message(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(user_id, "Review channel closed by party");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(user_id, error = %e, "Review channel error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    registry.disconnect(&user_id, token).await;
    info!(user_id, "Review channel connection finished");
}

async fn send_server_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

/// Dispatch one inbound frame. Malformed or unrecognized messages get an
/// error reply; they never tear the connection down.
async fn handle_client_message(
    text: &str,
    user_id: &str,
    coordinator: &ReviewCoordinator,
) -> Option<ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::DraftResponse { data }) => {
            if !coordinator.resolve_review(user_id, data).await {
                debug!(user_id, "Draft response had no pending review");
            }
            None
        }
        Ok(ClientMessage::Ping) => Some(ServerMessage::Pong),
        Ok(ClientMessage::ConnectionTestResponse) => None,
        Ok(ClientMessage::Status) => {
            let pending = coordinator.registry().pending_count(user_id).await;
            Some(ServerMessage::StatusResponse {
                data: StatusData {
                    user_id: user_id.to_string(),
                    connected: true,
                    pending_reviews: pending,
                },
            })
        }
        Err(e) => {
            debug!(user_id, error = %e, "Unrecognized message from party");
            Some(ServerMessage::Error {
                data: ErrorData {
                    message: format!("Unrecognized message: {e}"),
                },
            })
        }
    }
}
