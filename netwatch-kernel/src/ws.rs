//! Transport WebSocket des abonnés dashboard.
//!
//! Chaque connexion devient un abonné du publisher : une tâche pousse les
//! messages du canal vers la socket, la boucle courante lit les commandes.

use crate::http::AppState;
use crate::monitor::Monitor;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app.monitor))
}

async fn handle_socket(socket: WebSocket, monitor: Arc<Monitor>) {
    // enregistrement + snapshot initial avant toute mise à jour incrémentale
    let (id, mut rx) = monitor.connect_subscriber();
    tracing::info!("[ws] subscriber {} connected", id);

    let (mut sink, mut stream) = socket.split();

    let sender_id = id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                tracing::debug!("[ws] sink closed for {}", sender_id);
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => monitor.handle_client_text(&id, text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("[ws] receive error on {}: {}", id, e);
                break;
            }
        }
    }

    monitor.disconnect_subscriber(&id);
    send_task.abort();
    tracing::info!("[ws] subscriber {} disconnected", id);
}
