// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation membership lookups.
//!
//! The WebSocket handler asks whether a user may focus a conversation, and
//! conversation-scoped publishes need the human members to address. Backed by
//! the relational store in production and by an in-memory table otherwise.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use parking_lot::RwLock;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::parcel::Id;

pub const FLAG_OWNER: i64 = 1 << 0;
pub const FLAG_SYSTEM: i64 = 1 << 1;
pub const FLAG_ASSISTANT: i64 = 1 << 2;
/// Members with any of these bits set are not people.
pub const NON_HUMAN_FLAGS: i64 = FLAG_SYSTEM | FLAG_ASSISTANT;

const MAX_CONNECTIONS: u32 = 5;

pub type DirectoryFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

pub trait Directory: Send + Sync + 'static {
    /// Whether `user` is a member of `conversation`.
    fn is_member(&self, user: Id, conversation: Id) -> DirectoryFuture<'_, bool>;

    /// Users of the human members of `conversation`.
    fn human_members(&self, conversation: Id) -> DirectoryFuture<'_, Vec<Id>>;
}

/// Membership from the `conversationMember` table.
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(MAX_CONNECTIONS).connect(url).await?;
        tracing::info!("membership database connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Directory for PgDirectory {
    fn is_member(&self, user: Id, conversation: Id) -> DirectoryFuture<'_, bool> {
        Box::pin(async move {
            let exists: bool = sqlx::query_scalar(
                r#"select exists (
                    select 1 from "conversationMember"
                    where "conversation" = $1 and "user" = $2
                )"#,
            )
            .bind(conversation)
            .bind(user)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        })
    }

    fn human_members(&self, conversation: Id) -> DirectoryFuture<'_, Vec<Id>> {
        Box::pin(async move {
            let users: Vec<Id> = sqlx::query_scalar(
                r#"select "user" from "conversationMember"
                   where "conversation" = $1 and "flag" & $2 = 0"#,
            )
            .bind(conversation)
            .bind(NON_HUMAN_FLAGS)
            .fetch_all(&self.pool)
            .await?;
            Ok(users)
        })
    }
}

/// In-memory membership table for standalone mode and tests.
#[derive(Default)]
pub struct StaticDirectory {
    members: RwLock<HashMap<Id, Vec<(Id, i64)>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or re-flag a member.
    pub fn add_member(&self, conversation: Id, user: Id, flag: i64) {
        let mut members = self.members.write();
        let list = members.entry(conversation).or_default();
        match list.iter_mut().find(|(u, _)| *u == user) {
            Some(entry) => entry.1 = flag,
            None => list.push((user, flag)),
        }
    }

    pub fn remove_member(&self, conversation: Id, user: Id) {
        let mut members = self.members.write();
        if let Some(list) = members.get_mut(&conversation) {
            list.retain(|(u, _)| *u != user);
            if list.is_empty() {
                members.remove(&conversation);
            }
        }
    }
}

impl Directory for StaticDirectory {
    fn is_member(&self, user: Id, conversation: Id) -> DirectoryFuture<'_, bool> {
        let found = self
            .members
            .read()
            .get(&conversation)
            .is_some_and(|list| list.iter().any(|(u, _)| *u == user));
        Box::pin(async move { Ok(found) })
    }

    fn human_members(&self, conversation: Id) -> DirectoryFuture<'_, Vec<Id>> {
        let users = self
            .members
            .read()
            .get(&conversation)
            .map(|list| {
                list.iter().filter(|(_, flag)| flag & NON_HUMAN_FLAGS == 0).map(|(u, _)| *u).collect()
            })
            .unwrap_or_default();
        Box::pin(async move { Ok(users) })
    }
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
