// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process [`SharedStore`] for standalone mode and tests.
//!
//! Clones share state, so several service instances built on clones of one
//! `MemoryStore` behave like processes sharing one Redis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::parcel::Id;
use crate::store::{PayloadStream, SharedStore, StoreFuture};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    counters: Mutex<HashMap<Id, i64>>,
    tickets: Mutex<HashMap<String, (String, Instant)>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    published: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `publish` calls made through any clone.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Whether a counter entry exists for `user` (absent once it reaches zero).
    pub fn has_counter(&self, user: Id) -> bool {
        self.inner.counters.lock().contains_key(&user)
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.inner.channels.lock();
        channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl SharedStore for MemoryStore {
    fn incr_connections(&self, user: Id) -> StoreFuture<'_, i64> {
        let mut counters = self.inner.counters.lock();
        let n = counters.entry(user).or_insert(0);
        *n += 1;
        let n = *n;
        Box::pin(async move { Ok(n) })
    }

    fn decr_connections(&self, user: Id) -> StoreFuture<'_, i64> {
        let mut counters = self.inner.counters.lock();
        let current = counters.get(&user).copied().unwrap_or(0);
        let n = if current > 1 {
            counters.insert(user, current - 1);
            current - 1
        } else {
            counters.remove(&user);
            0
        };
        Box::pin(async move { Ok(n) })
    }

    fn connections(&self, user: Id) -> StoreFuture<'_, i64> {
        let n = self.inner.counters.lock().get(&user).copied().unwrap_or(0);
        Box::pin(async move { Ok(n) })
    }

    fn put_ticket<'a>(
        &'a self,
        ticket: &'a str,
        value: String,
        ttl: Duration,
    ) -> StoreFuture<'a, ()> {
        let expires_at = Instant::now() + ttl;
        self.inner.tickets.lock().insert(ticket.to_owned(), (value, expires_at));
        Box::pin(async { Ok(()) })
    }

    fn take_ticket<'a>(&'a self, ticket: &'a str) -> StoreFuture<'a, Option<String>> {
        let value = self
            .inner
            .tickets
            .lock()
            .remove(ticket)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value);
        Box::pin(async move { Ok(value) })
    }

    fn publish<'a>(&'a self, channel: &'a str, payload: String) -> StoreFuture<'a, ()> {
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        // No subscribers is not an error, same as PUBLISH returning 0.
        let _ = self.sender(channel).send(payload);
        Box::pin(async { Ok(()) })
    }

    fn subscribe<'a>(&'a self, channel: &'a str) -> StoreFuture<'a, PayloadStream> {
        let rx = self.sender(channel).subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|item| async move {
            match item {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::debug!(err = %e, "memory subscriber lagged");
                    None
                }
            }
        });
        let stream: PayloadStream = Box::pin(stream);
        Box::pin(async move { Ok(stream) })
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
