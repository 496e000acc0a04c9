// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a courier builder and an in-process server.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::CourierConfig;
use crate::directory::StaticDirectory;
use crate::state::Courier;
use crate::store::MemoryStore;

/// Builder for constructing a `Courier` in tests with in-memory backends.
///
/// Builders given clones of one `MemoryStore` act as processes of one cluster.
pub struct CourierBuilder {
    config: CourierConfig,
    store: MemoryStore,
    directory: Arc<StaticDirectory>,
    shutdown: CancellationToken,
}

impl Default for CourierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CourierBuilder {
    pub fn new() -> Self {
        Self {
            config: CourierConfig::default(),
            store: MemoryStore::new(),
            directory: Arc::new(StaticDirectory::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn auth_token(mut self, token: &str) -> Self {
        self.config.auth_token = Some(token.to_owned());
        self
    }

    pub fn node_id(mut self, node: &str) -> Self {
        self.config.node_id = Some(node.to_owned());
        self
    }

    pub fn ticket_ttl_ms(mut self, ms: u64) -> Self {
        self.config.ticket_ttl_ms = ms;
        self
    }

    pub fn peer_buffer(mut self, frames: usize) -> Self {
        self.config.peer_buffer = frames;
        self
    }

    pub fn store(mut self, store: MemoryStore) -> Self {
        self.store = store;
        self
    }

    pub fn directory(mut self, directory: Arc<StaticDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn build(self) -> Arc<Courier> {
        Arc::new(Courier::new(
            self.config,
            Arc::new(self.store),
            self.directory,
            self.shutdown,
        ))
    }
}

/// Start the broadcast subscriber and serve the router on a random port.
///
/// Returns the bound address and a join handle for the server task.
pub async fn spawn_http_server(
    courier: Arc<Courier>,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    Arc::clone(&courier.fanout).start_subscriber(courier.shutdown.clone()).await?;
    let shutdown = courier.shutdown.clone();
    let router = crate::transport::build_router(courier);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await;
    });
    Ok((addr, handle))
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
