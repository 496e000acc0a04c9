// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis (or KeyDB) backed [`SharedStore`].

use std::time::Duration;

use anyhow::Context;
use futures_util::StreamExt;

use crate::parcel::Id;
use crate::store::{PayloadStream, SharedStore, StoreFuture, StoreKeys};

/// Decrement a hash field and drop it once it reaches zero, in one round trip.
const DECR_SCRIPT: &str = r"
local n = redis.call('HINCRBY', KEYS[1], ARGV[1], -1)
if n <= 0 then
  redis.call('HDEL', KEYS[1], ARGV[1])
  return 0
end
return n
";

pub struct RedisStore {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
    keys: StoreKeys,
    decr: redis::Script,
}

impl RedisStore {
    /// Open a multiplexed connection used for commands and publishes.
    /// Subscriptions get their own dedicated connection.
    pub async fn connect(url: &str, keys: StoreKeys) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .with_context(|| format!("connecting to {url}"))?;
        tracing::info!(url, status = %keys.status, "shared store connected");
        Ok(Self { client, conn, keys, decr: redis::Script::new(DECR_SCRIPT) })
    }
}

impl SharedStore for RedisStore {
    fn incr_connections(&self, user: Id) -> StoreFuture<'_, i64> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let n: i64 = redis::cmd("HINCRBY")
                .arg(&self.keys.status)
                .arg(user)
                .arg(1)
                .query_async(&mut conn)
                .await?;
            Ok(n)
        })
    }

    fn decr_connections(&self, user: Id) -> StoreFuture<'_, i64> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let n: i64 =
                self.decr.key(&self.keys.status).arg(user).invoke_async(&mut conn).await?;
            Ok(n)
        })
    }

    fn connections(&self, user: Id) -> StoreFuture<'_, i64> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let n: Option<i64> =
                redis::cmd("HGET").arg(&self.keys.status).arg(user).query_async(&mut conn).await?;
            Ok(n.unwrap_or(0))
        })
    }

    fn put_ticket<'a>(
        &'a self,
        ticket: &'a str,
        value: String,
        ttl: Duration,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            let _: () = redis::cmd("SET")
                .arg(self.keys.ticket(ticket))
                .arg(value)
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
    }

    fn take_ticket<'a>(&'a self, ticket: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Option<String> =
                redis::cmd("GETDEL").arg(self.keys.ticket(ticket)).query_async(&mut conn).await?;
            Ok(value)
        })
    }

    fn publish<'a>(&'a self, channel: &'a str, payload: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let receivers: i64 =
                redis::cmd("PUBLISH").arg(channel).arg(payload).query_async(&mut conn).await?;
            tracing::trace!(channel, receivers, "published");
            Ok(())
        })
    }

    fn subscribe<'a>(&'a self, channel: &'a str) -> StoreFuture<'a, PayloadStream> {
        Box::pin(async move {
            let mut pubsub = self
                .client
                .get_async_pubsub()
                .await
                .context("opening pub/sub connection")?;
            pubsub.subscribe(channel).await?;
            let stream = pubsub.into_on_message().filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::debug!(err = %e, "non-text pub/sub payload dropped");
                        None
                    }
                }
            });
            let stream: PayloadStream = Box::pin(stream);
            Ok(stream)
        })
    }
}

#[cfg(test)]
#[path = "redis_store_tests.rs"]
mod tests;
