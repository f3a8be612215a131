//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the database pool (sessions, tickets, access codes) and the wall's
//! collaborators behind trait objects, so every websocket connection can
//! build its own `PrayerWall` from the same ledger and directory.

use std::sync::Arc;

use sqlx::PgPool;

use crate::services::directory::{Directory, PgDirectory};
use crate::services::email_auth::{EmailConfig, SignUpPolicy};
use crate::services::ledger::{Ledger, PgLedger};
use crate::services::notify::NotifyHandle;
use crate::wall::PrayerWall;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub ledger: Arc<dyn Ledger>,
    pub directory: Arc<dyn Directory>,
    /// Optional notification side channel. `None` if not configured.
    pub notify: Option<NotifyHandle>,
    /// Optional email delivery for access codes. `None` if not configured.
    pub email: Option<EmailConfig>,
    /// Invite gate and owner address for new accounts.
    pub sign_up: SignUpPolicy,
}

impl AppState {
    /// Postgres-backed state.
    #[must_use]
    pub fn new(pool: PgPool, notify: Option<NotifyHandle>, email: Option<EmailConfig>, sign_up: SignUpPolicy) -> Self {
        Self {
            ledger: Arc::new(PgLedger::new(pool.clone())),
            directory: Arc::new(PgDirectory::new(pool.clone())),
            pool,
            notify,
            email,
            sign_up,
        }
    }

    /// A fresh wall context for one viewer.
    #[must_use]
    pub fn new_wall(&self) -> PrayerWall {
        PrayerWall::new(Arc::clone(&self.ledger), Arc::clone(&self.directory), self.notify.clone())
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
