// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the courier.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::Courier;

/// Build the axum `Router` with all courier routes.
pub fn build_router(state: Arc<Courier>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Ticket pairing
        .route("/api/v1/tickets", post(http::issue_ticket))
        // Publishing
        .route("/api/v1/publish", post(http::publish))
        .route("/api/v1/conversations/{id}/publish", post(http::publish_conversation))
        // Event stream (ticket auth)
        .route("/event/{ticket}", get(ws::event_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
