// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parcel types: the typed change notifications pushed to live connections.
//!
//! Parcels use adjacently-tagged JSON (`{"type": "...", "payload": ...}`).
//! The `type` strings are the ones clients already match on, so they must not
//! change. Two enums cover the two directions: [`Parcel`] (server to client)
//! and [`ClientParcel`] (client to server).
//!
//! Validation happens at the trust boundary by decoding into these enums; an
//! unknown tag or a payload of the wrong shape is simply "not a parcel".

use serde::{Deserialize, Serialize};

/// Numeric identifier used by the relational layer (platform, user,
/// conversation, member and message ids).
pub type Id = i64;

// -- Payloads -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamablePlatform {
    pub display_name: String,
    pub display_image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamableConversation {
    pub id: Id,
    pub flag: i64,
    pub display_name: String,
    pub display_image_url: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamableConversationMember {
    pub id: Id,
    pub flag: i64,
    pub created_at: String,
    pub display_name: String,
    pub display_avatar_url: String,
    pub display_bio: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamableMessage {
    pub id: Id,
    pub flag: i64,
    pub platform: Id,
    pub author: Id,
    pub conversation: Id,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Reference to a deleted message. Carries the owning conversation so the
/// delete can be shaped per peer like create and update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: Id,
    pub conversation: Id,
}

// -- Server -> Client ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Parcel {
    #[serde(rename = "ar1s.platform.update")]
    PlatformUpdate(StreamablePlatform),
    #[serde(rename = "ar1s.conversation.create")]
    ConversationCreate(StreamableConversation),
    #[serde(rename = "ar1s.conversation.update")]
    ConversationUpdate(StreamableConversation),
    // Deployed clients match on this exact (misspelled) tag.
    #[serde(rename = "ar1s.converastion.delete")]
    ConversationDelete(Id),
    #[serde(rename = "ar1s.conversationMember.create")]
    ConversationMemberCreate(StreamableConversationMember),
    #[serde(rename = "ar1s.conversationMember.update")]
    ConversationMemberUpdate(StreamableConversationMember),
    #[serde(rename = "ar1s.conversationMember.delete")]
    ConversationMemberDelete(Id),
    #[serde(rename = "ar1s.message.create")]
    MessageCreate(StreamableMessage),
    #[serde(rename = "ar1s.message.update")]
    MessageUpdate(StreamableMessage),
    #[serde(rename = "ar1s.message.delete")]
    MessageDelete(MessageRef),
    /// Something changed in a conversation the peer is not looking at.
    #[serde(rename = "ar1s._notify.messageCreateOnConversation")]
    NotifyUnreadOnConversation(Id),
    #[serde(rename = "ar1s._server.ack")]
    Acknowledge,
    #[serde(rename = "ar1s._server.ig")]
    Ignore,
}

impl Parcel {
    /// Decode an untrusted JSON value. `None` when it is not a server parcel.
    pub fn decode(value: &serde_json::Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }

    /// True for message create/update/delete.
    pub fn is_message_event(&self) -> bool {
        matches!(self, Self::MessageCreate(_) | Self::MessageUpdate(_) | Self::MessageDelete(_))
    }

    /// Owning conversation of a message event; `None` for every other variant.
    pub fn message_conversation(&self) -> Option<Id> {
        match self {
            Self::MessageCreate(m) | Self::MessageUpdate(m) => Some(m.conversation),
            Self::MessageDelete(r) => Some(r.conversation),
            _ => None,
        }
    }

    /// Wire tag of this parcel, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlatformUpdate(_) => "ar1s.platform.update",
            Self::ConversationCreate(_) => "ar1s.conversation.create",
            Self::ConversationUpdate(_) => "ar1s.conversation.update",
            Self::ConversationDelete(_) => "ar1s.converastion.delete",
            Self::ConversationMemberCreate(_) => "ar1s.conversationMember.create",
            Self::ConversationMemberUpdate(_) => "ar1s.conversationMember.update",
            Self::ConversationMemberDelete(_) => "ar1s.conversationMember.delete",
            Self::MessageCreate(_) => "ar1s.message.create",
            Self::MessageUpdate(_) => "ar1s.message.update",
            Self::MessageDelete(_) => "ar1s.message.delete",
            Self::NotifyUnreadOnConversation(_) => "ar1s._notify.messageCreateOnConversation",
            Self::Acknowledge => "ar1s._server.ack",
            Self::Ignore => "ar1s._server.ig",
        }
    }
}

// -- Client -> Server ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientParcel {
    /// Focus the connection on a conversation.
    #[serde(rename = "ar1s._client.subscribe")]
    Subscribe(Id),
}

impl ClientParcel {
    pub fn decode(value: &serde_json::Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }

    /// Decode a raw text frame. Invalid JSON and unknown shapes are `None`.
    pub fn decode_text(text: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        Self::decode(&value)
    }
}

// -- Validators ---------------------------------------------------------------

/// True iff `value` is a well-formed server-to-client parcel.
pub fn validate_outbound(value: &serde_json::Value) -> bool {
    Parcel::decode(value).is_some()
}

/// True iff `value` is a well-formed client-to-server parcel.
pub fn validate_inbound(value: &serde_json::Value) -> bool {
    ClientParcel::decode(value).is_some()
}

#[cfg(test)]
#[path = "parcel_tests.rs"]
mod tests;
