//! Sessions and websocket tickets.
//!
//! ARCHITECTURE
//! ============
//! A browser keeps its session token in an http-only cookie and trades it for
//! a short-lived ticket each time the wall page opens a socket. Tickets are
//! redeemed by `directory`, which turns one straight into an `Identity` in
//! the same statement that burns it.

use std::fmt::Write;

use rand::Rng;
use sqlx::{PgPool, Row};

use crate::wall::model::UserId;

/// Session lifetime, shared by the `sessions` row and the cookie max-age.
pub const SESSION_DAYS: i32 = 30;

/// Seconds a websocket ticket stays redeemable.
pub const TICKET_SECS: f64 = 60.0;

/// `N` random bytes as lowercase hex.
fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes[..]);
    bytes.iter().fold(String::with_capacity(N * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[must_use]
pub fn new_session_token() -> String {
    random_hex::<32>()
}

#[must_use]
pub fn new_ticket() -> String {
    random_hex::<16>()
}

// =============================================================================
// SESSIONS
// =============================================================================

/// Open a session for `uid`, pruning that user's expired sessions first.
pub async fn open_session(pool: &PgPool, uid: UserId) -> Result<String, sqlx::Error> {
    let token = new_session_token();
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND expires_at <= now()")
        .bind(uid)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, now() + make_interval(days => $3))")
        .bind(&token)
        .bind(uid)
        .bind(SESSION_DAYS)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(token)
}

/// The user behind a live session token.
pub async fn session_user(pool: &PgPool, token: &str) -> Result<Option<UserId>, sqlx::Error> {
    let row = sqlx::query("SELECT user_id FROM sessions WHERE token = $1 AND expires_at > now()")
        .bind(token)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("user_id")))
}

pub async fn close_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = $1").bind(token).execute(pool).await?;
    Ok(())
}

// =============================================================================
// TICKETS
// =============================================================================

/// Issue a one-time ticket for opening the wall socket as `uid`.
pub async fn issue_ticket(pool: &PgPool, uid: UserId) -> Result<String, sqlx::Error> {
    let ticket = new_ticket();
    sqlx::query("INSERT INTO ws_tickets (ticket, user_id, expires_at) VALUES ($1, $2, now() + make_interval(secs => $3))")
        .bind(&ticket)
        .bind(uid)
        .bind(TICKET_SECS)
        .execute(pool)
        .await?;
    Ok(ticket)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
