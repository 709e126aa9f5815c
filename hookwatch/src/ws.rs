//! WebSocket fan-out of recorded events

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use hookwatch_core::Ingestor;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(ingestor): State<Arc<Ingestor>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ingestor))
}

/// Pump envelopes from the hub to one client until either side goes away.
async fn handle_socket(socket: WebSocket, ingestor: Arc<Ingestor>) {
    let hub = ingestor.hub().clone();
    let mut subscription = hub.register();
    let id = subscription.id();
    tracing::info!(subscriber = id, "WebSocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            envelope = subscription.recv() => {
                let Some(envelope) = envelope else { break };
                let text = match envelope.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to serialize envelope");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    tracing::debug!(subscriber = id, "WebSocket send failed, client disconnected");
                    break;
                }
            }
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Ping(data))) => {
                    if ws_tx.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(subscriber = id, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    hub.unregister(id);
    tracing::info!(subscriber = id, "WebSocket client disconnected");
}
