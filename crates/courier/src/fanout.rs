// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster fan-out of parcels to every live connection of a user set.
//!
//! `publish` always serves this process's own peers directly. Recipients
//! whose connections are not all local are then broadcast once on the shared
//! channel as `{origin, users, parcel}`; every other process delivers that
//! envelope to its own local peers and never re-broadcasts it. The origin
//! skips its own envelopes since the direct path already covered them.
//!
//! Delivery is at-least-once per peer while the shared connection counter
//! catches up with concurrent connects.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::directory::Directory;
use crate::focus::deliver_shaped;
use crate::parcel::{Id, Parcel};
use crate::registry::PeerRegistry;
use crate::store::{PayloadStream, SharedStore};

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 5000;

/// Broadcast channel message.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    origin: &'a str,
    users: &'a [Id],
    parcel: &'a Parcel,
}

/// Envelope as received; the parcel is re-validated separately.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    origin: String,
    users: Vec<Id>,
    parcel: serde_json::Value,
}

/// What a single `publish` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Frames queued on this process's peers.
    pub local_frames: usize,
    /// Recipients included in the broadcast (0 when nothing was broadcast).
    pub broadcast_users: usize,
}

pub struct Fanout {
    registry: Arc<PeerRegistry>,
    store: Arc<dyn SharedStore>,
    channel: String,
    node: String,
}

impl Fanout {
    pub fn new(
        registry: Arc<PeerRegistry>,
        store: Arc<dyn SharedStore>,
        channel: String,
        node: String,
    ) -> Self {
        Self { registry, store, channel, node }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Deliver `parcel` to every live connection of `users`.
    pub async fn publish(&self, users: &[Id], parcel: &Parcel) -> anyhow::Result<PublishReport> {
        let mut seen = HashSet::with_capacity(users.len());
        let mut remote = Vec::new();
        let mut report = PublishReport::default();

        for &user in users {
            if !seen.insert(user) {
                continue;
            }
            let peers = self.registry.local_peers_of(user);
            report.local_frames += deliver_shaped(peers.iter().map(Arc::as_ref), parcel);

            match self.registry.is_user_only_locally_connected(user).await {
                Ok(true) => {}
                Ok(false) => remote.push(user),
                Err(e) => {
                    tracing::warn!(user, err = %e, "connection count unavailable, broadcasting");
                    remote.push(user);
                }
            }
        }

        if !remote.is_empty() {
            let envelope = Envelope { origin: &self.node, users: &remote, parcel };
            let payload = serde_json::to_string(&envelope)?;
            self.store.publish(&self.channel, payload).await?;
            report.broadcast_users = remote.len();
        }

        tracing::debug!(
            kind = parcel.kind(),
            recipients = seen.len(),
            local_frames = report.local_frames,
            broadcast_users = report.broadcast_users,
            "parcel published"
        );
        Ok(report)
    }

    /// Validate untrusted JSON and publish it. `Ok(None)` when it is not a
    /// valid outbound parcel; nothing is delivered in that case.
    pub async fn publish_value(
        &self,
        users: &[Id],
        value: &serde_json::Value,
    ) -> anyhow::Result<Option<PublishReport>> {
        let Some(parcel) = Parcel::decode(value) else {
            tracing::debug!("dropping invalid outbound parcel");
            return Ok(None);
        };
        self.publish(users, &parcel).await.map(Some)
    }

    /// Publish to the human members of a conversation.
    pub async fn publish_to_conversation(
        &self,
        directory: &dyn Directory,
        conversation: Id,
        parcel: &Parcel,
    ) -> anyhow::Result<PublishReport> {
        let users = directory.human_members(conversation).await?;
        self.publish(&users, parcel).await
    }

    /// Fire-and-forget publish. Failures are logged, never returned.
    pub fn dispatch(self: &Arc<Self>, users: Vec<Id>, parcel: Parcel) -> JoinHandle<()> {
        let fanout = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = fanout.publish(&users, &parcel).await {
                tracing::error!(kind = parcel.kind(), err = %e, "parcel publish failed");
            }
        })
    }

    /// Handle one broadcast payload: deliver to local peers of the listed
    /// users. Returns the number of frames queued.
    pub fn deliver_envelope(&self, payload: &str) -> usize {
        let envelope: RawEnvelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(err = %e, "dropping malformed broadcast envelope");
                return 0;
            }
        };
        if envelope.origin == self.node {
            return 0;
        }
        let Some(parcel) = Parcel::decode(&envelope.parcel) else {
            tracing::debug!(origin = %envelope.origin, "dropping broadcast with invalid parcel");
            return 0;
        };

        let mut seen = HashSet::with_capacity(envelope.users.len());
        envelope
            .users
            .iter()
            .filter(|user| seen.insert(**user))
            .map(|&user| {
                let peers = self.registry.local_peers_of(user);
                deliver_shaped(peers.iter().map(Arc::as_ref), &parcel)
            })
            .sum()
    }

    /// Subscribe to the broadcast channel and spawn the delivery loop.
    ///
    /// The first subscription happens before returning so the caller knows
    /// remote publications are being received. Later drops are re-subscribed
    /// with capped exponential backoff until `shutdown`.
    pub async fn start_subscriber(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<JoinHandle<()>> {
        let stream = self.store.subscribe(&self.channel).await?;
        tracing::info!(channel = %self.channel, node = %self.node, "broadcast subscriber started");
        Ok(tokio::spawn(async move { self.run_subscriber(stream, shutdown).await }))
    }

    async fn run_subscriber(&self, initial: PayloadStream, shutdown: CancellationToken) {
        let mut stream = Some(initial);
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            if let Some(mut messages) = stream.take() {
                backoff_ms = INITIAL_BACKOFF_MS;
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        msg = messages.next() => match msg {
                            Some(payload) => {
                                self.deliver_envelope(&payload);
                            }
                            None => {
                                tracing::warn!(channel = %self.channel, "broadcast subscription ended");
                                break;
                            }
                        }
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
            }
            backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);

            match self.store.subscribe(&self.channel).await {
                Ok(s) => {
                    tracing::info!(channel = %self.channel, "broadcast subscriber reconnected");
                    stream = Some(s);
                }
                Err(e) => {
                    tracing::warn!(channel = %self.channel, err = %e, backoff_ms, "re-subscribe failed");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
