// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Focus-aware shaping of outbound parcels.
//!
//! A peer that is not looking at a conversation gets a lightweight
//! "unread activity in C" notice instead of the full message body.
//! Shaping is per peer: two connections of one user may receive different
//! parcels for the same event.

use std::borrow::Cow;

use crate::parcel::Parcel;
use crate::registry::Peer;

/// Parcel to deliver to `peer` for an event `parcel`.
pub fn shape_for_peer<'a>(peer: &Peer, parcel: &'a Parcel) -> Cow<'a, Parcel> {
    match parcel.message_conversation() {
        Some(conversation) if !peer.is_focused_on(conversation) => {
            Cow::Owned(Parcel::NotifyUnreadOnConversation(conversation))
        }
        _ => Cow::Borrowed(parcel),
    }
}

/// Shape and queue `parcel` for every peer in `peers`. Returns the number of
/// frames queued.
pub fn deliver_shaped<'p>(peers: impl IntoIterator<Item = &'p Peer>, parcel: &Parcel) -> usize {
    peers.into_iter().filter(|peer| peer.send(&shape_for_peer(peer, parcel))).count()
}

#[cfg(test)]
#[path = "focus_tests.rs"]
mod tests;
