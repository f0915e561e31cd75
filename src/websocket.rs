use axum::{
    extract::{ws::Message, State, WebSocketUpgrade},
    response::Response,
};
use axum::extract::ws::WebSocket;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info};

use crate::relay::{ControlMessage, RelaySession};
use crate::state::{AppState, ConnectionInfo};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// One task per connection: client frames drive the session state machine,
/// speech events from the remote stream are relayed back in order. The
/// select keeps both directions on a single task so no per-connection
/// locking is needed.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_uid = state.generate_client_uid();
    info!("New WebSocket connection: {}", client_uid);

    state.connections.insert(
        client_uid.clone(),
        ConnectionInfo {
            connected_at: Utc::now(),
        },
    );

    let (mut sender, mut receiver) = socket.split();
    let mut session = RelaySession::new(state.speech.clone());

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let outbound = match incoming {
                    Some(Ok(Message::Text(text))) => {
                        session.handle_control(ControlMessage::parse(&text)).await
                    }
                    Some(Ok(Message::Binary(frame))) => {
                        session.handle_audio(frame).await
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client {} disconnected", client_uid);
                        break;
                    }
                    Some(Ok(_)) => None, // ping/pong answered by axum
                    Some(Err(e)) => {
                        error!("WebSocket error for {}: {}", client_uid, e);
                        break;
                    }
                };
                if let Some(msg) = outbound {
                    if sender.send(Message::Text(msg.to_json())).await.is_err() {
                        break;
                    }
                }
            }
            event = session.next_event() => {
                if sender.send(Message::Text(event.to_json())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Releases the remote handle if still streaming; the client is gone,
    // so no further messages are sent
    session.shutdown().await;
    state.connections.remove(&client_uid);
    info!("Cleaned up client {}", client_uid);
}
