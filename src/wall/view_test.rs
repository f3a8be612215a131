use super::*;
use crate::state::test_helpers::{member, request};
use crate::wall::model::{Capability, Role};

// =============================================================================
// count_label
// =============================================================================

#[test]
fn count_label_zero() {
    assert_eq!(count_label(0), "0 requests.");
}

#[test]
fn count_label_singular() {
    assert_eq!(count_label(1), "1 request currently posted.");
}

#[test]
fn count_label_plural() {
    assert_eq!(count_label(2), "2 requests currently posted.");
    assert_eq!(count_label(17), "17 requests currently posted.");
}

#[test]
fn prayer_count_label_branches() {
    assert_eq!(prayer_count_label(0), "0 people praying");
    assert_eq!(prayer_count_label(1), "1 person praying");
    assert_eq!(prayer_count_label(4), "4 people praying");
}

// =============================================================================
// author / posted-at
// =============================================================================

#[test]
fn blank_author_renders_anonymous() {
    assert_eq!(author_label(""), ANONYMOUS);
    assert_eq!(author_label("   "), ANONYMOUS);
    assert_eq!(author_label("  Ruth "), "Ruth");
}

#[test]
fn posted_at_pending_is_empty() {
    assert_eq!(posted_at_label(None), "");
}

#[test]
fn posted_at_formats_utc() {
    // 2024-03-04T19:05:00Z
    assert_eq!(posted_at_label(Some(1_709_579_100_000)), "Mar 04, 2024, 7:05 PM UTC");
}

#[test]
fn posted_at_midnight_is_twelve_am() {
    // 2024-01-01T00:30:00Z
    assert_eq!(posted_at_label(Some(1_704_069_000_000)), "Jan 01, 2024, 12:30 AM UTC");
}

// =============================================================================
// ordering
// =============================================================================

#[test]
fn newest_first() {
    let a = request("a", Some(1_000), &[]);
    let b = request("b", Some(2_000), &[]);
    let mut list = vec![a.clone(), b.clone()];
    order_newest_first(&mut list, 5_000);
    assert_eq!(list[0].id, b.id);
    assert_eq!(list[1].id, a.id);
}

#[test]
fn pending_timestamp_sorts_to_top() {
    let old = request("old", Some(1_000), &[]);
    let pending = request("pending", None, &[]);
    let mut list = vec![old.clone(), pending.clone()];
    order_newest_first(&mut list, 9_000);
    assert_eq!(list[0].id, pending.id);
}

#[test]
fn ties_keep_arrival_order() {
    let first = request("first", Some(3_000), &[]);
    let second = request("second", Some(3_000), &[]);
    let third = request("third", Some(3_000), &[]);
    let mut list = vec![first.clone(), second.clone(), third.clone()];
    order_newest_first(&mut list, 9_000);
    let ids: Vec<_> = list.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first.id, second.id, third.id]);
}

// =============================================================================
// render_card
// =============================================================================

#[test]
fn card_for_signed_out_viewer_blocks_actions() {
    let r = request("Healing", Some(1_000), &[]);
    let card = render_card(&r, None, Capability { can_delete: true }, false, false);
    assert!(!card.can_pray);
    assert!(!card.can_delete);
    assert!(!card.already_praying);
    assert_eq!(card.author, ANONYMOUS);
}

#[test]
fn card_delete_follows_capability() {
    let viewer = member("Naomi");
    let r = request("Travel", Some(1_000), &[]);

    let hidden = render_card(&r, Some(&viewer), Capability::default(), false, false);
    assert!(!hidden.can_delete);

    let shown = render_card(&r, Some(&viewer), Capability::for_profile(Role::Owner, false), false, false);
    assert!(shown.can_delete);
}

#[test]
fn card_marks_viewer_already_praying() {
    let viewer = member("Boaz");
    let r = request("Family", Some(1_000), &[viewer.uid]);
    let card = render_card(&r, Some(&viewer), Capability::default(), true, false);
    assert!(card.already_praying);
    assert!(card.open);
    assert_eq!(card.prayer_count_label, "1 person praying");
}

#[test]
fn blank_title_falls_back() {
    let mut r = request("x", Some(1_000), &[]);
    r.title = "  ".into();
    let card = render_card(&r, None, Capability::default(), false, false);
    assert_eq!(card.title, UNTITLED);
}

#[test]
fn card_carries_raw_timestamp_for_local_formatting() {
    let r = request("Harvest", Some(1_709_579_100_000), &[]);
    let card = render_card(&r, None, Capability::default(), false, false);
    assert_eq!(card.created_at, Some(1_709_579_100_000));
    assert_eq!(card.posted_at, "Mar 04, 2024, 7:05 PM UTC");

    let pending = request("Harvest", None, &[]);
    assert_eq!(render_card(&pending, None, Capability::default(), false, false).created_at, None);
}
