// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::directory::{StaticDirectory, FLAG_ASSISTANT, FLAG_OWNER};
use crate::parcel::StreamableMessage;
use crate::store::MemoryStore;

const CHANNEL: &str = "test.delivery.pubsub";
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

struct Node {
    registry: Arc<PeerRegistry>,
    fanout: Arc<Fanout>,
}

fn node(store: &MemoryStore, name: &str) -> Node {
    let store: Arc<dyn SharedStore> = Arc::new(store.clone());
    let registry = Arc::new(PeerRegistry::new(Arc::clone(&store)));
    let fanout =
        Arc::new(Fanout::new(Arc::clone(&registry), store, CHANNEL.to_owned(), name.to_owned()));
    Node { registry, fanout }
}

async fn connect(
    node: &Node,
    user: Id,
    focus: Id,
) -> anyhow::Result<(String, mpsc::Receiver<String>)> {
    let (tx, rx) = mpsc::channel(16);
    let id = node.registry.register(1, user, tx).await?;
    node.registry.set_focus(&id, focus);
    Ok((id, rx))
}

async fn recv_json(rx: &mut mpsc::Receiver<String>) -> anyhow::Result<serde_json::Value> {
    let frame = tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("frame queue closed"))?;
    Ok(serde_json::from_str(&frame)?)
}

fn message(conversation: Id) -> Parcel {
    Parcel::MessageCreate(StreamableMessage {
        id: 55,
        flag: 0,
        platform: 1,
        author: 2,
        conversation,
        content: "hello".to_owned(),
        created_at: "2026-01-01T00:00:00.000Z".to_owned(),
        updated_at: "2026-01-01T00:00:00.000Z".to_owned(),
    })
}

#[tokio::test]
async fn purely_local_user_is_not_broadcast() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let a = node(&store, "a");
    let (_id, mut rx) = connect(&a, 1, 0).await?;

    let report = a.fanout.publish(&[1], &Parcel::ConversationDelete(9)).await?;

    assert_eq!(report, PublishReport { local_frames: 1, broadcast_users: 0 });
    assert_eq!(store.published(), 0);
    assert_eq!(recv_json(&mut rx).await?["type"], "ar1s.converastion.delete");
    Ok(())
}

#[tokio::test]
async fn user_on_two_processes_gets_both_deliveries() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let a = node(&store, "a");
    let b = node(&store, "b");
    let shutdown = CancellationToken::new();
    let sub_a = Arc::clone(&a.fanout).start_subscriber(shutdown.clone()).await?;
    let sub_b = Arc::clone(&b.fanout).start_subscriber(shutdown.clone()).await?;

    let (_pa, mut rx_a) = connect(&a, 1, 0).await?;
    let (_pb, mut rx_b) = connect(&b, 1, 0).await?;

    let report = a.fanout.publish(&[1], &Parcel::ConversationDelete(9)).await?;
    assert_eq!(report, PublishReport { local_frames: 1, broadcast_users: 1 });
    assert_eq!(store.published(), 1);

    assert_eq!(recv_json(&mut rx_a).await?["payload"], 9);
    assert_eq!(recv_json(&mut rx_b).await?["payload"], 9);

    // The origin ignores its own envelope; nothing else arrives.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());

    shutdown.cancel();
    sub_a.await?;
    sub_b.await?;
    Ok(())
}

#[tokio::test]
async fn remote_only_user_is_reached_through_broadcast() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let a = node(&store, "a");
    let b = node(&store, "b");
    let shutdown = CancellationToken::new();
    let _sub = Arc::clone(&b.fanout).start_subscriber(shutdown.clone()).await?;
    let (_pb, mut rx_b) = connect(&b, 4, 3).await?;

    let report = a.fanout.publish(&[4], &message(3)).await?;
    assert_eq!(report, PublishReport { local_frames: 0, broadcast_users: 1 });

    let frame = recv_json(&mut rx_b).await?;
    assert_eq!(frame["type"], "ar1s.message.create");
    assert_eq!(frame["payload"]["content"], "hello");
    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn broadcast_only_carries_users_with_remote_connections() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let a = node(&store, "a");
    let b = node(&store, "b");
    let shutdown = CancellationToken::new();
    let _sub = Arc::clone(&b.fanout).start_subscriber(shutdown.clone()).await?;

    let (_p1, mut rx1) = connect(&a, 1, 0).await?;
    let (_p2, _rx2) = connect(&b, 2, 0).await?;

    let report = a.fanout.publish(&[1, 2, 1], &Parcel::ConversationDelete(5)).await?;
    assert_eq!(report, PublishReport { local_frames: 1, broadcast_users: 1 });
    assert_eq!(recv_json(&mut rx1).await?["payload"], 5);
    assert!(rx1.try_recv().is_err(), "duplicate recipients must be collapsed");
    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn shaping_applies_on_the_receiving_process() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let a = node(&store, "a");
    let b = node(&store, "b");
    let shutdown = CancellationToken::new();
    let _sub = Arc::clone(&b.fanout).start_subscriber(shutdown.clone()).await?;

    let (_focused, mut rx_focused) = connect(&b, 6, 3).await?;
    let (_elsewhere, mut rx_elsewhere) = connect(&b, 6, 8).await?;

    a.fanout.publish(&[6], &message(3)).await?;

    assert_eq!(recv_json(&mut rx_focused).await?["type"], "ar1s.message.create");
    assert_eq!(
        recv_json(&mut rx_elsewhere).await?,
        serde_json::json!({"type": "ar1s._notify.messageCreateOnConversation", "payload": 3})
    );
    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn own_envelopes_are_skipped() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let a = node(&store, "a");
    let (_id, mut rx) = connect(&a, 1, 0).await?;

    let own = serde_json::json!({
        "origin": "a",
        "users": [1],
        "parcel": {"type": "ar1s.converastion.delete", "payload": 2},
    });
    assert_eq!(a.fanout.deliver_envelope(&own.to_string()), 0);

    let foreign = serde_json::json!({
        "origin": "b",
        "users": [1, 1],
        "parcel": {"type": "ar1s.converastion.delete", "payload": 2},
    });
    assert_eq!(a.fanout.deliver_envelope(&foreign.to_string()), 1);
    assert_eq!(recv_json(&mut rx).await?["payload"], 2);
    Ok(())
}

#[tokio::test]
async fn invalid_envelopes_are_dropped() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let a = node(&store, "a");
    let (_id, mut rx) = connect(&a, 1, 0).await?;

    for payload in [
        "{not json",
        r#"{"origin":"b","parcel":{"type":"ar1s._server.ack"}}"#,
        r#"{"origin":"b","users":[1],"parcel":{"type":"ar1s.bogus","payload":1}}"#,
        r#"{"origin":"b","users":[1],"parcel":{"type":"ar1s.converastion.delete","payload":"x"}}"#,
    ] {
        assert_eq!(a.fanout.deliver_envelope(payload), 0, "payload: {payload}");
    }
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn invalid_value_is_not_published() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let a = node(&store, "a");
    let b = node(&store, "b");
    let (_pb, _rx) = connect(&b, 1, 0).await?;

    let bogus = serde_json::json!({"type": "ar1s.message.create", "payload": {"id": 1}});
    assert_eq!(a.fanout.publish_value(&[1], &bogus).await?, None);
    assert_eq!(store.published(), 0);

    let valid = serde_json::json!({"type": "ar1s.converastion.delete", "payload": 1});
    let report = a.fanout.publish_value(&[1], &valid).await?;
    assert_eq!(report, Some(PublishReport { local_frames: 0, broadcast_users: 1 }));
    assert_eq!(store.published(), 1);
    Ok(())
}

#[tokio::test]
async fn conversation_publish_skips_non_human_members() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let a = node(&store, "a");
    let directory = StaticDirectory::new();
    directory.add_member(3, 1, FLAG_OWNER);
    directory.add_member(3, 2, FLAG_ASSISTANT);

    let (_human, mut rx_human) = connect(&a, 1, 3).await?;
    let (_bot, mut rx_bot) = connect(&a, 2, 3).await?;

    let report = a.fanout.publish_to_conversation(&directory, 3, &message(3)).await?;
    assert_eq!(report.local_frames, 1);
    assert_eq!(recv_json(&mut rx_human).await?["type"], "ar1s.message.create");
    assert!(rx_bot.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn dispatch_runs_in_background() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let a = node(&store, "a");
    let (_id, mut rx) = connect(&a, 1, 0).await?;

    a.fanout.dispatch(vec![1], Parcel::ConversationMemberDelete(12)).await?;
    assert_eq!(recv_json(&mut rx).await?["type"], "ar1s.conversationMember.delete");
    Ok(())
}
