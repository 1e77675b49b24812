//! WebSocket connection gateway.
//!
//! Each accepted socket runs one task with a simple lifecycle:
//! connecting -> bound (registered) -> closed.  The identity arrives in
//! the `user_id` query parameter, already verified by the upstream auth
//! layer; this component trusts it and never re-checks credentials.  A
//! socket without an identity stays open but is never registered: it
//! receives no broadcasts and cannot be targeted for delivery.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use duplex_shared::UserId;

use crate::api::AppState;
use crate::error::ServerError;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Pre-authenticated identity.  Absent for anonymous connections.
    pub user_id: Option<String>,
}

/// `GET /ws` upgrade handler.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let identity = match params.user_id.as_deref() {
        Some(raw) => Some(
            UserId::parse(raw)
                .map_err(|e| ServerError::BadRequest(format!("Invalid user_id: {e}")))?,
        ),
        None => None,
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(state, identity, socket)))
}

async fn handle_socket(state: AppState, identity: Option<UserId>, socket: WebSocket) {
    let conn_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Registering hands the push sender to the registry; for an anonymous
    // socket we keep it alive locally so the event loop stays parked
    // instead of tearing down.
    let _anonymous_keepalive = match identity {
        Some(user) => {
            state.presence.register(user, conn_id, tx);
            if let Ok(store) = state.store.lock() {
                if let Err(e) = store.record_peer(user) {
                    warn!(%user, error = %e, "failed to record peer in directory");
                }
            }
            None
        }
        None => {
            debug!(conn = %conn_id, "anonymous connection, not registered");
            Some(tx)
        }
    };

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    let frame = match event.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(conn = %conn_id, error = %e, "dropping unencodable event");
                            continue;
                        }
                    };
                    if sink.send(WsMessage::Text(frame)).await.is_err() {
                        debug!(conn = %conn_id, "send failed, closing");
                        break;
                    }
                }
                // The registry dropped our sender: a newer connection for
                // the same identity took over.
                None => {
                    debug!(conn = %conn_id, "superseded by a newer connection");
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(conn = %conn_id, error = %e, "socket error");
                    break;
                }
                // Clients speak to the server over the HTTP API; inbound
                // socket frames carry nothing we act on.
                Some(Ok(_)) => {}
            },
        }
    }

    // Runs once per task regardless of how many close signals raced in;
    // the conn-id guard makes a late call after replacement a no-op.
    if let Some(user) = identity {
        state.presence.unregister(user, conn_id);
    }
}
