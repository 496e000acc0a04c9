// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::store::StoreKeys;

/// Configuration for the courier delivery service.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "courier", version, about = "Real-time parcel delivery over WebSocket")]
pub struct CourierConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "COURIER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "COURIER_PORT")]
    pub port: u16,

    /// Bearer token for the REST API. If unset, auth is disabled.
    #[arg(long, env = "COURIER_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Redis URL for the shared store. If unset, runs standalone in memory.
    #[arg(long, env = "COURIER_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Postgres URL for conversation membership. If unset, membership is empty.
    #[arg(long, env = "COURIER_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Prefix for every shared-store key and channel.
    #[arg(long, default_value = "ar1s", env = "COURIER_NAMESPACE")]
    pub namespace: String,

    /// Ticket lifetime in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "EVENT_TICKET_EXPIRATION")]
    pub ticket_ttl_ms: u64,

    /// Frames buffered per connection before new ones are dropped.
    #[arg(long, default_value_t = 256, env = "COURIER_PEER_BUFFER")]
    pub peer_buffer: usize,

    /// Process identity on the broadcast channel. Random when unset.
    #[arg(long, env = "COURIER_NODE_ID")]
    pub node_id: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "COURIER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level or filter directive (e.g. `info`, `courier=debug`).
    #[arg(long, env = "COURIER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl CourierConfig {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.namespace.is_empty() {
            anyhow::bail!("--namespace must not be empty");
        }
        if self.ticket_ttl_ms == 0 {
            anyhow::bail!("--ticket-ttl-ms must be positive");
        }
        if self.peer_buffer == 0 {
            anyhow::bail!("--peer-buffer must be positive");
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("--log-format must be json or text, got {}", self.log_format);
        }
        Ok(())
    }

    pub fn ticket_ttl(&self) -> Duration {
        Duration::from_millis(self.ticket_ttl_ms)
    }

    pub fn store_keys(&self) -> StoreKeys {
        StoreKeys::new(&self.namespace)
    }

    pub fn pubsub_channel(&self) -> String {
        format!("{}.delivery.pubsub", self.namespace)
    }
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            auth_token: None,
            redis_url: None,
            database_url: None,
            namespace: "ar1s".to_owned(),
            ticket_ttl_ms: 60_000,
            peer_buffer: 256,
            node_id: None,
            log_format: "text".to_owned(),
            log_level: "info".to_owned(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
