//! WebSocket upgrade handler.
//!
//! Each connected client receives every [`WsEvent`] published after it
//! connects. The channel is push-only: conversation operations go through
//! the REST endpoints.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::broadcast::WsEvent;

/// Shared state for WebSocket handlers.
#[derive(Clone)]
pub struct WsState {
    pub broadcast_tx: broadcast::Sender<WsEvent>,
}

/// GET /ws — WebSocket upgrade handler.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ws_state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ws_state))
}

async fn handle_socket(socket: WebSocket, ws_state: WsState) {
    let (mut sink, mut stream) = socket.split();
    let mut broadcast_rx = ws_state.broadcast_tx.subscribe();
    debug!("WebSocket client connected");

    let forward_task = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(event) => {
                    if ws_send(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged by {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Drain the client side until it closes; inbound text is ignored.
    while let Some(Ok(msg)) = stream.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    debug!("WebSocket client disconnected");
    forward_task.abort();
}

async fn ws_send(sink: &mut SplitSink<WebSocket, Message>, event: &WsEvent) -> Result<(), ()> {
    let json = serde_json::to_string(event).map_err(|_| ())?;
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
