// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Courier: real-time parcel delivery for chat clients.
//!
//! Clients trade a REST-issued ticket for a WebSocket, and every change to
//! their conversations is pushed to each of their live connections, across
//! any number of courier processes sharing one Redis.

pub mod config;
pub mod directory;
pub mod error;
pub mod fanout;
pub mod focus;
pub mod parcel;
pub mod registry;
pub mod state;
pub mod store;
pub mod test_support;
pub mod ticket;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::CourierConfig;
use crate::directory::{Directory, PgDirectory, StaticDirectory};
use crate::state::Courier;
use crate::store::{MemoryStore, RedisStore, SharedStore};
use crate::transport::build_router;

/// Run the courier server until SIGTERM or SIGINT.
pub async fn run(config: CourierConfig) -> anyhow::Result<()> {
    config.validate()?;
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let store: Arc<dyn SharedStore> = match config.redis_url {
        Some(ref url) => Arc::new(RedisStore::connect(url, config.store_keys()).await?),
        None => {
            info!("no redis url configured, running standalone");
            Arc::new(MemoryStore::new())
        }
    };

    let directory: Arc<dyn Directory> = match config.database_url {
        Some(ref url) => Arc::new(PgDirectory::connect(url).await?),
        None => {
            tracing::warn!("no database url configured, every subscribe will be ignored");
            Arc::new(StaticDirectory::new())
        }
    };

    let courier = Arc::new(Courier::new(config, store, directory, shutdown.clone()));
    let subscriber = Arc::clone(&courier.fanout).start_subscriber(shutdown.clone()).await?;

    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&addr).await?;
    info!(node = %courier.node_id, "courier listening on {addr}");
    let result = axum::serve(listener, build_router(courier))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    if let Err(e) = subscriber.await {
        tracing::error!(err = %e, "broadcast subscriber task failed");
    }
    result?;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
}
