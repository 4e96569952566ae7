//! WebSocket handler: chat socket relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID, admits the connection, writes the
//! history replay straight to the socket, then enters a `select!` loop:
//! - Incoming client text → relay engine (which fans out to everyone,
//!   sender included)
//! - Events queued for this client by the engine → forward to socket
//!
//! The replay is written before the queue is drained, and admission and
//! replay snapshot are atomic, so every client sees history followed by
//! live events with nothing lost or duplicated in between.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade with optional `userId` query param (unauthenticated)
//! 2. Admit + replay
//! 3. Relay until close or send failure
//! 4. Remove from registry

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::OutboundEvent;
use crate::services::relay;
use crate::state::AppState;

/// Query parameter carrying the connecting user's id.
pub const USER_ID_PARAM: &str = "userId";

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = params
        .get(USER_ID_PARAM)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty());
    ws.on_upgrade(move |socket| run_ws(socket, state, user_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user_id: Option<String>) {
    let client_id = Uuid::new_v4();

    // Per-connection queue for events fanned out by the relay engine.
    let (client_tx, mut client_rx) = mpsc::channel::<OutboundEvent>(state.config.client_queue_capacity);

    let replay = relay::join(&state, client_id, user_id, client_tx).await;
    for event in &replay {
        if send_event(&mut socket, event).await.is_err() {
            relay::part(&state, client_id).await;
            return;
        }
    }

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        relay::handle_inbound_text(&state, client_id, text.as_str()).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = client_rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    relay::part(&state, client_id).await;
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_event(socket: &mut WebSocket, event: &OutboundEvent) -> Result<(), ()> {
    let json = match event.to_json() {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize event");
            return Err(());
        }
    };
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
