// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event WebSocket: one live connection per redeemed ticket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::CourierError;
use crate::parcel::{ClientParcel, Parcel};
use crate::state::Courier;
use crate::ticket::TicketClaim;

/// `GET /event/{ticket}`: redeem the ticket, then upgrade.
pub async fn event_handler(
    State(state): State<Arc<Courier>>,
    Path(ticket): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let claim = match state.tickets.redeem(&ticket).await {
        Ok(Some(claim)) => claim,
        Ok(None) => {
            return CourierError::PermissionDenied.to_http_response("invalid ticket").into_response();
        }
        Err(e) => return CourierError::store(e),
    };

    ws.on_upgrade(move |socket| handle_peer(socket, state, claim)).into_response()
}

/// Per-connection loop. The peer is unregistered exactly once on exit.
async fn handle_peer(socket: WebSocket, state: Arc<Courier>, claim: TicketClaim) {
    let (tx, mut rx) = mpsc::channel(state.config.peer_buffer.max(1));
    let id = match state.registry.register(claim.platform, claim.user, tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(user = claim.user, err = %format!("{e:#}"), "peer registration failed");
            return;
        }
    };
    tracing::info!(peer = %id, platform = claim.platform, user = claim.user, "peer connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }

            msg = ws_rx.next() => {
                let reply = match msg {
                    Some(Ok(Message::Text(text))) => handle_client_frame(&state, &id, claim, text.as_str()).await,
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => handle_client_frame(&state, &id, claim, text).await,
                        Err(_) => Some(Parcel::Ignore),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %id, err = %e, "socket read failed");
                        break;
                    }
                    Some(Ok(_)) => None,
                };
                if let Some(reply) = reply {
                    let Ok(text) = serde_json::to_string(&reply) else { continue };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    match state.registry.unregister(&id).await {
        Ok(_) => tracing::info!(peer = %id, user = claim.user, "peer disconnected"),
        Err(e) => tracing::warn!(peer = %id, err = %format!("{e:#}"), "peer unregister failed"),
    }
}

/// Reply to one client frame. `None` when the peer is already gone.
async fn handle_client_frame(
    state: &Courier,
    peer: &str,
    claim: TicketClaim,
    text: &str,
) -> Option<Parcel> {
    let Some(ClientParcel::Subscribe(conversation)) = ClientParcel::decode_text(text) else {
        return Some(Parcel::Ignore);
    };

    match state.directory.is_member(claim.user, conversation).await {
        Ok(true) => {
            if !state.registry.set_focus(peer, conversation) {
                return None;
            }
            tracing::debug!(peer, conversation, "peer focused");
            Some(Parcel::Acknowledge)
        }
        Ok(false) => Some(Parcel::Ignore),
        Err(e) => {
            tracing::warn!(peer, conversation, err = %format!("{e:#}"), "membership lookup failed");
            Some(Parcel::Ignore)
        }
    }
}
