// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the courier API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::CourierError;
use crate::fanout::PublishReport;
use crate::parcel::{Id, Parcel};
use crate::state::Courier;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node: String,
    pub peers: usize,
    pub users: usize,
}

#[derive(Debug, Deserialize)]
pub struct TicketRequest {
    pub platform: Id,
    pub user: Id,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TicketResponse {
    pub ticket: String,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub users: Vec<Id>,
    pub parcel: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ConversationPublishRequest {
    pub parcel: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub accepted: bool,
    pub local_frames: usize,
    pub broadcast_users: usize,
}

impl From<PublishReport> for PublishResponse {
    fn from(report: PublishReport) -> Self {
        Self {
            accepted: true,
            local_frames: report.local_frames,
            broadcast_users: report.broadcast_users,
        }
    }
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<Courier>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        node: s.node_id.clone(),
        peers: s.registry.peer_count(),
        users: s.registry.user_count(),
    })
}

/// `POST /api/v1/tickets`: pair an already-authenticated identity with a
/// one-time WebSocket ticket.
pub async fn issue_ticket(
    State(s): State<Arc<Courier>>,
    Json(req): Json<TicketRequest>,
) -> Response {
    match s.tickets.issue(req.platform, req.user).await {
        Ok(ticket) => Json(TicketResponse { ticket }).into_response(),
        Err(e) => CourierError::store(e),
    }
}

/// `POST /api/v1/publish`: deliver a parcel to a set of users.
pub async fn publish(State(s): State<Arc<Courier>>, Json(req): Json<PublishRequest>) -> Response {
    let Some(parcel) = Parcel::decode(&req.parcel) else {
        return CourierError::BadRequest.to_http_response("invalid parcel").into_response();
    };
    match s.fanout.publish(&req.users, &parcel).await {
        Ok(report) => (StatusCode::ACCEPTED, Json(PublishResponse::from(report))).into_response(),
        Err(e) => CourierError::store(e),
    }
}

/// `POST /api/v1/conversations/{id}/publish`: deliver a parcel to the human
/// members of a conversation.
pub async fn publish_conversation(
    State(s): State<Arc<Courier>>,
    Path(conversation): Path<Id>,
    Json(req): Json<ConversationPublishRequest>,
) -> Response {
    let Some(parcel) = Parcel::decode(&req.parcel) else {
        return CourierError::BadRequest.to_http_response("invalid parcel").into_response();
    };
    match s.fanout.publish_to_conversation(s.directory.as_ref(), conversation, &parcel).await {
        Ok(report) => (StatusCode::ACCEPTED, Json(PublishResponse::from(report))).into_response(),
        Err(e) => CourierError::store(e),
    }
}
