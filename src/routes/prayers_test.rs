use super::*;
use crate::state::test_helpers::{MemoryDirectory, MemoryLedger, member, request, test_app_state};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn first_render_waits_for_snapshot() {
    let a = request("a", Some(1_000), &[]);
    let b = request("b", Some(2_000), &[]);
    let ledger = MemoryLedger::seeded(vec![a, b.clone()]);
    let state = test_app_state(ledger.clone(), MemoryDirectory::new());
    let mut wall = state.new_wall();
    wall.sign_in(member("Ruth")).await;

    let view = first_render(&mut wall).await.expect("render");
    assert_eq!(view.cards.len(), 2);
    assert_eq!(view.cards[0].id, b.id);
    assert_eq!(view.count_label, "2 requests currently posted.");

    drop(wall);
    crate::state::test_helpers::wait_until(|| ledger.live_feeds.load(Ordering::SeqCst) == 0).await;
}

#[tokio::test]
async fn first_render_carries_subscription_status() {
    let ledger = MemoryLedger::new();
    ledger.deny_reads.store(true, Ordering::SeqCst);
    let state = test_app_state(ledger, MemoryDirectory::new());
    let mut wall = state.new_wall();
    wall.sign_in(member("Ruth")).await;

    let view = first_render(&mut wall).await.expect("render");
    assert!(view.cards.is_empty());
    assert_eq!(
        view.message.as_deref(),
        Some("Please sign in (and ensure your profile is set up) to view prayer requests.")
    );
}
