// src/handlers/ws.rs

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use tokio::sync::mpsc;

use crate::{
    error::ChallengeError,
    models::protocol::{ClientEvent, ServerEvent},
    session::ChallengeHub,
};

/// Upgrades `GET /ws` to the duel socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<ChallengeHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(hub, socket))
}

/// One task per connection: forwards queued events out and feeds inbound
/// frames to the hub in arrival order.
async fn handle_socket(hub: Arc<ChallengeHub>, mut socket: WebSocket) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let connection_id = hub.connect(tx);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!("Failed to encode {}: {:?}", event.name(), e),
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(text.as_str()) {
                            Ok(event) => hub.handle_event(&connection_id, event).await,
                            Err(e) => {
                                tracing::debug!("Unparseable frame on {}: {}", connection_id, e);
                                let err = ChallengeError::InvalidRequest(format!("Invalid message: {}", e));
                                hub.registry()
                                    .send_to_connection(&connection_id, ServerEvent::error(&err, None));
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Socket error on {}: {}", connection_id, e);
                        break;
                    }
                    _ => continue,
                }
            }
        }
    }

    hub.disconnect(&connection_id).await;
}
