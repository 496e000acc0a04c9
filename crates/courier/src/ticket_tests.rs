// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::store::MemoryStore;

fn issuer(ttl: Duration) -> (TicketIssuer, MemoryStore) {
    let store = MemoryStore::new();
    (TicketIssuer::new(Arc::new(store.clone()), ttl), store)
}

#[tokio::test]
async fn issue_then_redeem_once() -> anyhow::Result<()> {
    let (issuer, _) = issuer(Duration::from_secs(60));
    let ticket = issuer.issue(1, 7).await?;

    assert_eq!(issuer.redeem(&ticket).await?, Some(TicketClaim { platform: 1, user: 7 }));
    assert_eq!(issuer.redeem(&ticket).await?, None, "ticket must be single use");
    Ok(())
}

#[tokio::test]
async fn unknown_ticket_is_not_found() -> anyhow::Result<()> {
    let (issuer, _) = issuer(Duration::from_secs(60));
    assert_eq!(issuer.redeem("1700000000000deadbeefdeadbeef").await?, None);
    Ok(())
}

#[tokio::test]
async fn expired_ticket_is_not_found() -> anyhow::Result<()> {
    let (issuer, store) = issuer(Duration::from_millis(50));
    // Entry outlives its stamp in the store; the timestamp check must still reject it.
    let ticket = format!("{}0123456789abcdef", epoch_ms() - 1000);
    store
        .put_ticket(&ticket, format!("{}:1:7", epoch_ms() - 1000), Duration::from_secs(60))
        .await?;
    assert_eq!(issuer.redeem(&ticket).await?, None);

    let fresh = issuer.issue(1, 7).await?;
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(issuer.redeem(&fresh).await?, None);
    Ok(())
}

#[tokio::test]
async fn unparseable_entry_is_not_found() -> anyhow::Result<()> {
    let (issuer, store) = issuer(Duration::from_secs(60));
    let ticket = format!("{}0123456789abcdef", epoch_ms());
    store.put_ticket(&ticket, "now:one:seven".to_owned(), Duration::from_secs(60)).await?;
    assert_eq!(issuer.redeem(&ticket).await?, None);
    Ok(())
}

#[tokio::test]
async fn concurrent_redemption_has_one_winner() -> anyhow::Result<()> {
    let (issuer, _) = issuer(Duration::from_secs(60));
    let issuer = Arc::new(issuer);
    let ticket = issuer.issue(2, 9).await?;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let issuer = Arc::clone(&issuer);
        let ticket = ticket.clone();
        handles.push(tokio::spawn(async move { issuer.redeem(&ticket).await }));
    }
    let mut winners = 0;
    for handle in handles {
        if handle.await??.is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn issued_ticket_shape() -> anyhow::Result<()> {
    let (issuer, _) = issuer(Duration::from_secs(60));
    let ticket = issuer.issue(1, 7).await?;
    assert!(is_well_formed(&ticket), "ticket: {ticket}");
    let hash = &ticket[ticket.len() - 16..];
    assert!(hash.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    Ok(())
}

#[yare::parameterized(
    empty = { "" },
    hash_only = { "0123456789abcdef" },
    uppercase = { "17000000000000123456789ABCDEF" },
    letters_in_stamp = { "17000x00000000123456789abcdef" },
    path_traversal = { "../../etc/passwd0123456789abcdef" },
    too_long = { "1234567890123456789012345678900123456789abcdef" },
    multibyte = { "1\u{e9}0123456789abcde" },
    multibyte_hash = { "170000000000001234567\u{e9}abcdef" },
)]
fn malformed_tickets(ticket: &str) {
    assert!(!is_well_formed(ticket));
}
