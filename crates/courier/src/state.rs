// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::CourierConfig;
use crate::directory::Directory;
use crate::fanout::Fanout;
use crate::registry::PeerRegistry;
use crate::store::SharedStore;
use crate::ticket::TicketIssuer;

/// Shared courier state: one per process, handed to every handler.
pub struct Courier {
    pub config: CourierConfig,
    pub registry: Arc<PeerRegistry>,
    pub tickets: TicketIssuer,
    pub fanout: Arc<Fanout>,
    pub directory: Arc<dyn Directory>,
    pub node_id: String,
    pub shutdown: CancellationToken,
}

impl Courier {
    pub fn new(
        config: CourierConfig,
        store: Arc<dyn SharedStore>,
        directory: Arc<dyn Directory>,
        shutdown: CancellationToken,
    ) -> Self {
        let node_id =
            config.node_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let registry = Arc::new(PeerRegistry::new(Arc::clone(&store)));
        let tickets = TicketIssuer::new(Arc::clone(&store), config.ticket_ttl());
        let fanout = Arc::new(Fanout::new(
            Arc::clone(&registry),
            store,
            config.pubsub_channel(),
            node_id.clone(),
        ));
        Self { config, registry, tickets, fanout, directory, node_id, shutdown }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
