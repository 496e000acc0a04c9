// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster-shared key-value store: connection counters, pairing tickets and
//! the broadcast channel.
//!
//! This is the only state shared between processes. Every mutation goes
//! through a primitive that is atomic on the store side (hash increment,
//! get-and-delete), never a client-side read-modify-write.

pub mod memory;
pub mod redis_store;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;

use crate::parcel::Id;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Stream of raw payloads received on a broadcast channel.
pub type PayloadStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Shared store operations used by the delivery core.
///
/// Object-safe for use as `Arc<dyn SharedStore>`.
pub trait SharedStore: Send + Sync + 'static {
    /// Increment the cluster-wide connection count for `user`; returns the new value.
    fn incr_connections(&self, user: Id) -> StoreFuture<'_, i64>;

    /// Decrement the count for `user`, removing it at zero. Never goes negative.
    fn decr_connections(&self, user: Id) -> StoreFuture<'_, i64>;

    /// Current count for `user`; an absent entry reads as zero.
    fn connections(&self, user: Id) -> StoreFuture<'_, i64>;

    /// Store a ticket that expires after `ttl`.
    fn put_ticket<'a>(&'a self, ticket: &'a str, value: String, ttl: Duration)
        -> StoreFuture<'a, ()>;

    /// Atomically read and delete a ticket.
    fn take_ticket<'a>(&'a self, ticket: &'a str) -> StoreFuture<'a, Option<String>>;

    fn publish<'a>(&'a self, channel: &'a str, payload: String) -> StoreFuture<'a, ()>;

    /// Open a subscription. The stream ends when the underlying connection drops.
    fn subscribe<'a>(&'a self, channel: &'a str) -> StoreFuture<'a, PayloadStream>;
}

/// Key names inside the shared store.
#[derive(Debug, Clone)]
pub struct StoreKeys {
    /// Hash of user id -> live connection count.
    pub status: String,
    /// Prefix for ticket keys (`{prefix}:{ticket}`).
    pub ticket_prefix: String,
}

impl StoreKeys {
    pub fn new(namespace: &str) -> Self {
        Self {
            status: format!("{namespace}.delivery.status"),
            ticket_prefix: format!("{namespace}.event.tickets"),
        }
    }

    pub fn ticket(&self, ticket: &str) -> String {
        format!("{}:{ticket}", self.ticket_prefix)
    }
}
