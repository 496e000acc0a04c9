// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-time pairing tickets that bind a WebSocket upgrade to an identity the
//! REST layer already authenticated.
//!
//! A ticket is `{issued_ms}{16 hex chars}` and maps to
//! `"{issued_ms}:{platform}:{user}"` in the shared store. Redemption is a
//! store-side get-and-delete, so concurrent redemptions yield one winner.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::parcel::Id;
use crate::state::epoch_ms;
use crate::store::SharedStore;

const HASH_LEN: usize = 16;
const HASH_ALPHABET: &[u8] = b"0123456789abcdef";
/// Upper bound on accepted ticket length (20 timestamp digits + hash).
const MAX_TICKET_LEN: usize = 20 + HASH_LEN;

/// Identity a redeemed ticket was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketClaim {
    pub platform: Id,
    pub user: Id,
}

pub struct TicketIssuer {
    store: Arc<dyn SharedStore>,
    ttl: Duration,
}

impl TicketIssuer {
    pub fn new(store: Arc<dyn SharedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a ticket for an authenticated `(platform, user)`.
    pub async fn issue(&self, platform: Id, user: Id) -> anyhow::Result<String> {
        let now = epoch_ms();
        let ticket = format!("{now}{}", random_hash());
        self.store.put_ticket(&ticket, format!("{now}:{platform}:{user}"), self.ttl).await?;
        tracing::debug!(platform, user, "ticket issued");
        Ok(ticket)
    }

    /// Consume a ticket. `Ok(None)` for unknown, malformed, expired or
    /// already redeemed tickets.
    pub async fn redeem(&self, ticket: &str) -> anyhow::Result<Option<TicketClaim>> {
        if !is_well_formed(ticket) {
            return Ok(None);
        }
        let Some(value) = self.store.take_ticket(ticket).await? else {
            return Ok(None);
        };
        let Some((issued_ms, claim)) = parse_value(&value) else {
            tracing::warn!("discarding unparseable ticket entry");
            return Ok(None);
        };
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        if epoch_ms() > issued_ms.saturating_add(ttl_ms) {
            return Ok(None);
        }
        Ok(Some(claim))
    }
}

fn random_hash() -> String {
    let mut rng = rand::rng();
    (0..HASH_LEN)
        .map(|_| char::from(HASH_ALPHABET[rng.random_range(0..HASH_ALPHABET.len())]))
        .collect()
}

/// Cheap shape check so junk path segments never reach the store.
pub fn is_well_formed(ticket: &str) -> bool {
    if !ticket.is_ascii() || ticket.len() <= HASH_LEN || ticket.len() > MAX_TICKET_LEN {
        return false;
    }
    let (stamp, hash) = ticket.split_at(ticket.len() - HASH_LEN);
    stamp.bytes().all(|b| b.is_ascii_digit()) && hash.bytes().all(|b| HASH_ALPHABET.contains(&b))
}

fn parse_value(value: &str) -> Option<(u64, TicketClaim)> {
    let mut parts = value.splitn(3, ':');
    let issued_ms = parts.next()?.parse().ok()?;
    let platform = parts.next()?.parse().ok()?;
    let user = parts.next()?.parse().ok()?;
    Some((issued_ms, TicketClaim { platform, user }))
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
