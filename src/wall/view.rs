//! Card rendering: ordering, labels, and the serializable view the client draws.
//!
//! Rendering is a pure function of the records plus the viewer; it holds no
//! state of its own, so a full re-render after every snapshot is safe.

use serde::Serialize;
use time::OffsetDateTime;

use super::model::{Capability, Identity, PrayerRequest, RequestId};

pub const ANONYMOUS: &str = "Anonymous";
pub const UNTITLED: &str = "Untitled request";
pub const EMPTY_WALL: &str = "No prayer requests yet.";

// =============================================================================
// VIEW TYPES
// =============================================================================

/// One rendered prayer card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardView {
    pub id: RequestId,
    pub title: String,
    pub body: String,
    pub author: String,
    /// UTC fallback text; clients localize from `created_at` when they can.
    pub posted_at: String,
    /// Epoch milliseconds, `None` while the server timestamp is pending.
    pub created_at: Option<i64>,
    pub prayer_count: u32,
    pub prayer_count_label: String,
    pub open: bool,
    /// The praying control is live (an identity is present).
    pub can_pray: bool,
    pub already_praying: bool,
    /// The delete control is rendered at all.
    pub can_delete: bool,
}

/// The submission form as the client should draw it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormView {
    pub enabled: bool,
    pub name: String,
    pub title: String,
    pub body: String,
    pub error: Option<String>,
}

/// The whole wall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WallView {
    pub signed_in: bool,
    pub user_label: Option<String>,
    /// Signed in, first snapshot not yet received.
    pub loading: bool,
    pub count_label: String,
    /// Placeholder or status text shown instead of the list.
    pub message: Option<String>,
    pub cards: Vec<CardView>,
    pub open_id: Option<RequestId>,
    pub form: FormView,
}

impl WallView {
    /// At most one card is ever rendered open.
    #[cfg(test)]
    pub fn open_cards(&self) -> usize {
        self.cards.iter().filter(|c| c.open).count()
    }
}

// =============================================================================
// ORDERING
// =============================================================================

/// Sort newest first. Pending timestamps count as `now_ms`; the sort is
/// stable so equal timestamps keep arrival order.
pub fn order_newest_first(requests: &mut [PrayerRequest], now_ms: i64) {
    requests.sort_by(|a, b| {
        let a_ts = a.created_at.unwrap_or(now_ms);
        let b_ts = b.created_at.unwrap_or(now_ms);
        b_ts.cmp(&a_ts)
    });
}

// =============================================================================
// LABELS
// =============================================================================

#[must_use]
pub fn count_label(n: usize) -> String {
    match n {
        0 => "0 requests.".to_owned(),
        1 => "1 request currently posted.".to_owned(),
        n => format!("{n} requests currently posted."),
    }
}

#[must_use]
pub fn prayer_count_label(n: u32) -> String {
    if n == 1 { "1 person praying".to_owned() } else { format!("{n} people praying") }
}

#[must_use]
pub fn author_label(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() { ANONYMOUS.to_owned() } else { trimmed.to_owned() }
}

/// Format epoch milliseconds as e.g. `"Mar 04, 2025, 7:05 PM UTC"`.
/// Pending or out-of-range timestamps render as an empty string.
#[must_use]
pub fn posted_at_label(created_at: Option<i64>) -> String {
    let Some(ms) = created_at else {
        return String::new();
    };
    let Ok(dt) = OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000) else {
        return String::new();
    };
    let month = dt.month().to_string();
    let (hour, meridiem) = match dt.hour() {
        0 => (12, "AM"),
        h @ 1..=11 => (h, "AM"),
        12 => (12, "PM"),
        h => (h - 12, "PM"),
    };
    format!(
        "{} {:02}, {}, {}:{:02} {} UTC",
        &month[..3],
        dt.day(),
        dt.year(),
        hour,
        dt.minute(),
        meridiem
    )
}

// =============================================================================
// CARDS
// =============================================================================

/// Render one card for the given viewer.
#[must_use]
pub fn render_card(
    request: &PrayerRequest,
    viewer: Option<&Identity>,
    capability: Capability,
    open: bool,
    marked_locally: bool,
) -> CardView {
    let title = request.title.trim();
    CardView {
        id: request.id,
        title: if title.is_empty() { UNTITLED.to_owned() } else { title.to_owned() },
        body: request.body.clone(),
        author: author_label(&request.author_label),
        posted_at: posted_at_label(request.created_at),
        created_at: request.created_at,
        prayer_count: request.prayer_count,
        prayer_count_label: prayer_count_label(request.prayer_count),
        open,
        can_pray: viewer.is_some(),
        already_praying: marked_locally || viewer.is_some_and(|v| request.has_prayed(v.uid)),
        can_delete: viewer.is_some() && capability.can_delete,
    }
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
