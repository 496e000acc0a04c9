// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process peer registry.
//!
//! Holds every live connection accepted by this process, indexed by peer id
//! and by user id. Both indexes sit behind one lock so a peer is never
//! visible in one and missing from the other. The cluster-wide connection
//! counter in the shared store is bumped after the local insert and dropped
//! after the local removal; it is eventually consistent with the tables.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::parcel::{Id, Parcel};
use crate::store::SharedStore;

pub type PeerId = String;

/// Server-side handle of one live WebSocket connection.
#[derive(Debug)]
pub struct Peer {
    pub id: PeerId,
    pub platform: Id,
    pub user: Id,
    conn: mpsc::Sender<String>,
    /// Focused conversation, 0 when none.
    focus: AtomicI64,
}

impl Peer {
    pub fn focused_conversation(&self) -> Option<Id> {
        match self.focus.load(Ordering::Acquire) {
            0 => None,
            c => Some(c),
        }
    }

    pub fn is_focused_on(&self, conversation: Id) -> bool {
        conversation != 0 && self.focus.load(Ordering::Acquire) == conversation
    }

    fn set_focus(&self, conversation: Id) {
        self.focus.store(conversation, Ordering::Release);
    }

    /// Queue one parcel frame for the socket writer.
    ///
    /// Returns false when the frame was dropped (queue full or socket gone);
    /// the client re-syncs over REST.
    pub fn send(&self, parcel: &Parcel) -> bool {
        let frame = match serde_json::to_string(parcel) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(peer = %self.id, err = %e, "parcel serialization failed");
                return false;
            }
        };
        match self.conn.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(peer = %self.id, kind = parcel.kind(), "peer queue full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Default)]
struct Tables {
    by_id: HashMap<PeerId, Arc<Peer>>,
    by_user: HashMap<Id, Vec<Arc<Peer>>>,
}

pub struct PeerRegistry {
    tables: Mutex<Tables>,
    store: Arc<dyn SharedStore>,
}

impl PeerRegistry {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { tables: Mutex::new(Tables::default()), store }
    }

    /// Register a connection for `user` and return its fresh peer id.
    ///
    /// `conn` is the sending half of the socket writer's frame queue. If the
    /// shared counter cannot be bumped the local entry is rolled back.
    pub async fn register(
        &self,
        platform: Id,
        user: Id,
        conn: mpsc::Sender<String>,
    ) -> anyhow::Result<PeerId> {
        let id = {
            let mut tables = self.tables.lock();
            let id = loop {
                let candidate = uuid::Uuid::new_v4().simple().to_string();
                if !tables.by_id.contains_key(&candidate) {
                    break candidate;
                }
            };
            let peer =
                Arc::new(Peer { id: id.clone(), platform, user, conn, focus: AtomicI64::new(0) });
            tables.by_id.insert(id.clone(), Arc::clone(&peer));
            tables.by_user.entry(user).or_default().push(peer);
            id
        };

        match self.store.incr_connections(user).await {
            Ok(count) => {
                tracing::debug!(peer = %id, user, cluster_connections = count, "peer registered");
                Ok(id)
            }
            Err(e) => {
                self.remove_local(&id);
                Err(e.context("incrementing connection counter"))
            }
        }
    }

    /// Remove a peer. Repeated calls are no-ops and return `Ok(false)`.
    pub async fn unregister(&self, id: &str) -> anyhow::Result<bool> {
        let Some(peer) = self.remove_local(id) else {
            return Ok(false);
        };
        // The local entry is already gone, so a failed decrement leaves the
        // cluster counter one too high for this user.
        let count = match self.store.decr_connections(peer.user).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    peer = %id,
                    user = peer.user,
                    err = %format!("{e:#}"),
                    "connection counter decrement failed, cluster count may drift"
                );
                return Err(e.context(format!("decrementing connection counter of user {}", peer.user)));
            }
        };
        tracing::debug!(peer = %id, user = peer.user, cluster_connections = count, "peer unregistered");
        Ok(true)
    }

    fn remove_local(&self, id: &str) -> Option<Arc<Peer>> {
        let mut tables = self.tables.lock();
        let peer = tables.by_id.remove(id)?;
        if let Some(list) = tables.by_user.get_mut(&peer.user) {
            list.retain(|p| p.id != peer.id);
            if list.is_empty() {
                tables.by_user.remove(&peer.user);
            }
        }
        Some(peer)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Peer>> {
        self.tables.lock().by_id.get(id).cloned()
    }

    /// Focus a peer on a conversation (0 clears). Returns false if the peer is gone.
    pub fn set_focus(&self, id: &str, conversation: Id) -> bool {
        match self.get(id) {
            Some(peer) => {
                peer.set_focus(conversation);
                true
            }
            None => false,
        }
    }

    pub fn is_focused(&self, id: &str, conversation: Id) -> bool {
        self.get(id).is_some_and(|peer| peer.is_focused_on(conversation))
    }

    pub fn local_peers_of(&self, user: Id) -> Vec<Arc<Peer>> {
        self.tables.lock().by_user.get(&user).cloned().unwrap_or_default()
    }

    /// True when every live connection of `user` in the cluster is on this
    /// process. Best effort: the shared counter lags concurrent connects.
    pub async fn is_user_only_locally_connected(&self, user: Id) -> anyhow::Result<bool> {
        let local = self.local_peers_of(user).len() as i64;
        let cluster = self.store.connections(user).await?;
        Ok(local == cluster)
    }

    pub fn peer_count(&self) -> usize {
        self.tables.lock().by_id.len()
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().by_user.len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
