//! Prayer wall: the per-viewer context behind one live list of cards.
//!
//! ARCHITECTURE
//! ============
//! A `PrayerWall` owns everything one viewer's page would otherwise keep in
//! globals: the signed-in identity and its capability, the latest ledger
//! snapshot, the single open card, a pending delete confirmation, and the
//! submission form. The websocket task owns exactly one wall and feeds it
//! discrete events; handlers mutate the wall and the task re-renders.
//!
//! DESIGN
//! ======
//! - Writes go to the ledger and are never patched into the local list. The
//!   next snapshot from the subscription is the only source of truth.
//! - `open_id` is the only accordion state, so "at most one card open"
//!   holds by construction. A snapshot keeps it only if the card survived.
//! - Exactly one subscription per wall. Sign-out drops the handle, which
//!   aborts the ledger feed.

pub mod error;
pub mod model;
pub mod view;

use std::collections::HashSet;
use std::future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::frame::now_ms;
use crate::services::directory::{self, Directory};
use crate::services::ledger::{AtomicUpdate, Ledger, LedgerError, Snapshot, Subscription};
use crate::services::notify::NotifyHandle;

use error::{MSG_FIELDS_REQUIRED, WallError, WriteAction};
use model::{Capability, Identity, PrayerRequest, RequestDraft, RequestId};
use view::{CardView, FormView, WallView};

pub const DELETE_PROMPT: &str = "Delete this prayer request?";
pub const SIGN_IN_PROMPT: &str = "Please sign in to view prayer requests.";
pub const LOADING: &str = "Loading prayer requests...";

// =============================================================================
// TYPES
// =============================================================================

/// Confirmation the client must show before a delete goes through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletePrompt {
    pub id: RequestId,
    pub confirm: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    Declined,
    /// No matching delete was requested; nothing happened.
    NotRequested,
}

/// Result of feeding one ledger event into the wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    Snapshot,
    Failed,
    Ended,
}

#[derive(Debug, Clone, Default)]
struct FormState {
    name: String,
    title: String,
    body: String,
    error: Option<String>,
}

pub struct PrayerWall {
    ledger: Arc<dyn Ledger>,
    directory: Arc<dyn Directory>,
    notify: Option<NotifyHandle>,

    identity: Option<Identity>,
    capability: Capability,
    subscription: Option<Subscription>,

    requests: Vec<PrayerRequest>,
    /// A snapshot or a feed failure has arrived since the last subscribe.
    loaded: bool,
    /// Replaces the list when the feed fails.
    status: Option<String>,
    open_id: Option<RequestId>,
    pending_delete: Option<RequestId>,
    /// Requests this identity marked since sign-in; guards against a second
    /// write before the snapshot confirming the first one arrives.
    marked: HashSet<RequestId>,
    form: FormState,
}

impl PrayerWall {
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, directory: Arc<dyn Directory>, notify: Option<NotifyHandle>) -> Self {
        Self {
            ledger,
            directory,
            notify,
            identity: None,
            capability: Capability::default(),
            subscription: None,
            requests: Vec::new(),
            loaded: false,
            status: None,
            open_id: None,
            pending_delete: None,
            marked: HashSet::new(),
            form: FormState::default(),
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn capability(&self) -> Capability {
        self.capability
    }

    #[cfg(test)]
    pub fn open_id(&self) -> Option<RequestId> {
        self.open_id
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    fn find(&self, id: RequestId) -> Option<&PrayerRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    fn reset_view_state(&mut self) {
        self.requests.clear();
        self.loaded = false;
        self.status = None;
        self.open_id = None;
        self.pending_delete = None;
        self.marked.clear();
        self.form = FormState::default();
    }
}

// =============================================================================
// IDENTITY TRANSITIONS
// =============================================================================

impl PrayerWall {
    /// Sign in and subscribe. Signing in again as the same identity keeps
    /// the live subscription untouched.
    pub async fn sign_in(&mut self, identity: Identity) {
        if self.identity.as_ref().is_some_and(|cur| cur.uid == identity.uid) && self.subscription.is_some() {
            self.identity = Some(identity);
            return;
        }

        self.sign_out();
        self.capability = directory::capability_or_default(self.directory.as_ref(), identity.uid).await;
        info!(uid = %identity.uid, can_delete = self.capability.can_delete, "wall: signed in");
        self.identity = Some(identity);
        self.subscribe().await;
    }

    /// Drop the identity and tear down the subscription. Returns whether a
    /// subscription was active.
    pub fn sign_out(&mut self) -> bool {
        let had_subscription = self.subscription.take().is_some();
        if let Some(identity) = self.identity.take() {
            info!(uid = %identity.uid, "wall: signed out");
        }
        self.capability = Capability::default();
        self.reset_view_state();
        had_subscription
    }

    async fn subscribe(&mut self) {
        self.subscription = None;
        self.open_id = None;
        self.loaded = false;
        match self.ledger.subscribe().await {
            Ok(sub) => self.subscription = Some(sub),
            Err(e) => {
                warn!(error = %e, "wall: subscribe failed");
                self.fail_feed(&e);
            }
        }
    }

    /// Drop the current feed and subscribe again from a clean accordion.
    pub async fn resubscribe(&mut self) {
        if self.identity.is_some() {
            self.subscribe().await;
        }
    }
}

// =============================================================================
// LEDGER FEED
// =============================================================================

impl PrayerWall {
    /// Wait for the next ledger event and apply it. Pends forever while no
    /// subscription is active. Cancel-safe: nothing is applied until an event
    /// has been received.
    pub async fn poll_feed(&mut self) -> FeedEvent {
        let next = match self.subscription.as_mut() {
            Some(sub) => sub.next().await,
            None => future::pending().await,
        };
        self.apply_feed(next)
    }

    /// Apply one feed item. `None` means the feed ended.
    pub fn apply_feed(&mut self, item: Option<Result<Snapshot, LedgerError>>) -> FeedEvent {
        match item {
            Some(Ok(snapshot)) => {
                self.apply_snapshot(snapshot);
                FeedEvent::Snapshot
            }
            Some(Err(e)) => {
                warn!(error = %e, "wall: snapshot failed");
                self.fail_feed(&e);
                FeedEvent::Failed
            }
            None => {
                warn!("wall: ledger feed ended");
                self.subscription = None;
                self.fail_feed(&LedgerError::Closed);
                FeedEvent::Ended
            }
        }
    }

    /// Replace the list with a fresh snapshot.
    pub fn apply_snapshot(&mut self, mut snapshot: Snapshot) {
        view::order_newest_first(&mut snapshot, now_ms());
        self.requests = snapshot;
        self.loaded = true;
        self.status = None;

        let ids: HashSet<RequestId> = self.requests.iter().map(|r| r.id).collect();
        if self.open_id.is_some_and(|id| !ids.contains(&id)) {
            self.open_id = None;
        }
        if self.pending_delete.is_some_and(|id| !ids.contains(&id)) {
            self.pending_delete = None;
        }
        self.marked.retain(|id| ids.contains(id));
    }

    fn fail_feed(&mut self, err: &LedgerError) {
        self.requests.clear();
        self.loaded = true;
        self.open_id = None;
        self.pending_delete = None;
        self.status = Some(error::subscription_status(err).to_owned());
    }
}

// =============================================================================
// RENDER
// =============================================================================

impl PrayerWall {
    #[must_use]
    pub fn render(&self) -> WallView {
        let viewer = self.identity.as_ref();
        let loading = viewer.is_some() && !self.loaded;
        let cards: Vec<CardView> = if self.status.is_some() {
            Vec::new()
        } else {
            self.requests
                .iter()
                .map(|r| {
                    view::render_card(
                        r,
                        viewer,
                        self.capability,
                        self.open_id == Some(r.id),
                        self.marked.contains(&r.id),
                    )
                })
                .collect()
        };

        let message = if let Some(status) = &self.status {
            Some(status.clone())
        } else if viewer.is_none() {
            Some(SIGN_IN_PROMPT.to_owned())
        } else if loading {
            Some(LOADING.to_owned())
        } else if cards.is_empty() {
            Some(view::EMPTY_WALL.to_owned())
        } else {
            None
        };

        WallView {
            signed_in: viewer.is_some(),
            user_label: viewer.map(|v| v.label().to_owned()),
            loading,
            // No count until the list is known.
            count_label: if loading { String::new() } else { view::count_label(cards.len()) },
            message,
            cards,
            open_id: self.open_id,
            form: FormView {
                enabled: viewer.is_some(),
                name: self.form.name.clone(),
                title: self.form.title.clone(),
                body: self.form.body.clone(),
                error: self.form.error.clone(),
            },
        }
    }
}

// =============================================================================
// ACCORDION
// =============================================================================

impl PrayerWall {
    /// Header tap on card `id`. Returns the open card afterwards.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `id` is not in the current list.
    pub fn toggle(&mut self, id: RequestId) -> Result<Option<RequestId>, WallError> {
        if self.find(id).is_none() {
            return Err(WallError::NotFound(id));
        }
        self.open_id = if self.open_id == Some(id) { None } else { Some(id) };
        Ok(self.open_id)
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

impl PrayerWall {
    /// "I'm praying": one atomic count-and-record write per identity.
    ///
    /// # Errors
    ///
    /// `AuthRequired` when signed out, `NotFound` for unknown ids,
    /// `AlreadyPraying` when this identity already counted (no write), and
    /// `Write` when the ledger rejects the update.
    pub async fn pray(&mut self, id: RequestId) -> Result<(), WallError> {
        let Some(identity) = &self.identity else {
            return Err(WallError::AuthRequired("mark that you are praying"));
        };
        let uid = identity.uid;
        let Some(request) = self.find(id) else {
            return Err(WallError::NotFound(id));
        };
        if request.has_prayed(uid) || self.marked.contains(&id) {
            return Err(WallError::AlreadyPraying(id));
        }

        match self.ledger.update_atomic(id, AtomicUpdate::praying(uid)).await {
            Ok(()) => {
                info!(%id, %uid, "wall: praying marked");
                self.marked.insert(id);
                Ok(())
            }
            Err(LedgerError::AlreadyApplied { .. }) => {
                self.marked.insert(id);
                Err(WallError::AlreadyPraying(id))
            }
            Err(e) => {
                warn!(%id, %uid, error = %e, "wall: praying update failed");
                Err(WallError::write(WriteAction::Pray, e))
            }
        }
    }

    /// First step of a delete: checks rights and asks for confirmation.
    ///
    /// # Errors
    ///
    /// `AuthRequired`, `NotPermitted` without the delete capability, or
    /// `NotFound` for unknown ids.
    pub fn request_delete(&mut self, id: RequestId) -> Result<DeletePrompt, WallError> {
        if self.identity.is_none() {
            return Err(WallError::AuthRequired("delete prayer requests"));
        }
        if !self.capability.can_delete {
            return Err(WallError::NotPermitted);
        }
        if self.find(id).is_none() {
            return Err(WallError::NotFound(id));
        }
        self.pending_delete = Some(id);
        Ok(DeletePrompt { id, confirm: DELETE_PROMPT })
    }

    /// Second step of a delete. Only a confirmed, previously requested
    /// delete reaches the ledger.
    ///
    /// # Errors
    ///
    /// `NotPermitted` if the capability was lost in between, `Write` when the
    /// ledger rejects the delete.
    pub async fn confirm_delete(&mut self, id: RequestId, accepted: bool) -> Result<DeleteOutcome, WallError> {
        if self.pending_delete != Some(id) {
            return Ok(DeleteOutcome::NotRequested);
        }
        self.pending_delete = None;
        if !accepted {
            return Ok(DeleteOutcome::Declined);
        }
        if self.identity.is_none() || !self.capability.can_delete {
            return Err(WallError::NotPermitted);
        }

        match self.ledger.delete_by_id(id).await {
            Ok(()) => {
                info!(%id, "wall: request deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) => {
                warn!(%id, error = %e, "wall: delete failed");
                Err(WallError::write(WriteAction::Delete, e))
            }
        }
    }

    /// Post a new request from the form.
    ///
    /// # Errors
    ///
    /// `AuthRequired` when signed out, `Validation` for a blank title or
    /// body (no ledger call), `Write` when the ledger rejects the insert.
    pub async fn submit(&mut self, draft: RequestDraft) -> Result<RequestId, WallError> {
        let Some(identity) = &self.identity else {
            return Err(WallError::AuthRequired("submit a prayer request"));
        };
        let validated = draft.validate(identity.uid);

        self.form = FormState { name: draft.name, title: draft.title, body: draft.body, error: None };
        let Some(new_request) = validated else {
            self.form.error = Some(MSG_FIELDS_REQUIRED.to_owned());
            return Err(WallError::Validation(MSG_FIELDS_REQUIRED));
        };

        let display_name = view::author_label(&new_request.author_label);
        let title = new_request.title.clone();
        let message = new_request.body.clone();

        match self.ledger.create(new_request).await {
            Ok(id) => {
                info!(%id, "wall: request submitted");
                // Keep the name so repeat posters don't retype it.
                self.form.title.clear();
                self.form.body.clear();
                if let Some(notify) = &self.notify {
                    notify.announce(&display_name, &title, &message);
                }
                Ok(id)
            }
            Err(e) => {
                warn!(error = %e, "wall: submit failed");
                Err(WallError::write(WriteAction::Submit, e))
            }
        }
    }
}

#[cfg(test)]
#[path = "wall_test.rs"]
mod tests;
