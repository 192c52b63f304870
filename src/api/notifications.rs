use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::{api::handler::AppState, notifications::Notification};

/// Push every workflow notification to the client as JSON text frames
/// GET /notifications
pub async fn stream_notifications(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let rx = state.notifier.subscribe();
    ws.on_upgrade(move |socket| handle_notification_stream(socket, rx))
}

async fn handle_notification_stream(socket: WebSocket, mut rx: broadcast::Receiver<Notification>) {
    let (mut sender, mut receiver) = socket.split();

    // Only watch for the client going away; it has nothing to say to us.
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let json = match serde_json::to_string(&notification) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to serialize notification: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Notification subscriber lagged, {} message(s) dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    debug!("📴 Notification stream closed");
}
