//! WebSocket handler for room connections.

use axum::{
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::api::{ApiError, AppState};
use crate::auth::Identity;

use super::session::Session;
use super::types::ClientEvent;

/// Out-of-band credential, supplied as a query parameter.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(default)]
    token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// GET /ws/{room}?token=...
///
/// Admission runs before the upgrade: a refused connection is closed with
/// no payload exchanged and no session state created.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = state
        .gate
        .admit(state.log.as_ref(), &room, query.token.as_deref())
        .await?;
    info!("admitting {} to room {room}", identity.id);

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, room, identity)))
}

/// Drive one admitted connection until it closes.
async fn handle_socket(socket: WebSocket, state: AppState, room: String, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();

    let mut session = Session::new(identity.clone(), room.clone());
    let session_id = session.id();

    // Registration and history replay happen atomically under the room's
    // ordering lock, so the history event is queued ahead of any live
    // event generated after this connect.
    let mut event_rx = state.relay.attach(&room, &identity, session_id).await;
    session.open();

    let writer_identity = identity.id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!("failed to serialize event for {writer_identity}: {err}");
                    continue;
                }
            };
            // A failed write means the client is gone; cleanup happens in
            // the receive loop, not here.
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => {
                        state
                            .relay
                            .dispatch(&room, &identity, session_id, event)
                            .await;
                    }
                    // Tolerant inbound: unknown or malformed envelopes are
                    // dropped, never answered with an error frame.
                    Err(err) => {
                        debug!("ignoring unrecognized event from {}: {err}", identity.id);
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                debug!("ignoring binary message from {}", identity.id);
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!("{} closed the connection to {room}", identity.id);
                break;
            }
            Err(err) => {
                warn!("socket error for {} in {room}: {err}", identity.id);
                break;
            }
        }
    }

    // Cancel only this session's pending outbound writes. Persistence the
    // session already caused is durable regardless.
    send_task.abort();
    session.close(&state.registry);
    let lifetime = Utc::now() - session.created_at();
    info!(
        "session {session_id} for {} cleaned up after {}s",
        session.identity().id,
        lifetime.num_seconds()
    );
}
