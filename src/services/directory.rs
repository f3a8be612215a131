//! Directory: identity and role resolution.
//!
//! ARCHITECTURE
//! ============
//! The wall asks the directory two things: who holds this websocket ticket,
//! and what may that identity do. `PgDirectory` answers both from the
//! `users` and `profiles` tables. Sign-in and sign-out themselves arrive as
//! websocket frames; see `routes::ws`.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::wall::model::{Capability, Identity, Role, UserId};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("profile not found: {0}")]
    ProfileNotFound(UserId),
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::frame::ErrorCode for DirectoryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ProfileNotFound(_) => "E_PROFILE_NOT_FOUND",
            Self::InvalidProfile(_) => "E_INVALID_PROFILE",
            Self::Database(_) => "E_DATABASE",
        }
    }
}

#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    /// Consume a one-time websocket ticket and return its identity.
    async fn identify(&self, ticket: &str) -> Result<Option<Identity>, DirectoryError>;

    async fn resolve_capability(&self, uid: UserId) -> Result<Capability, DirectoryError>;
}

/// Resolve capability, treating any lookup failure as "no extra rights".
pub async fn capability_or_default(directory: &dyn Directory, uid: UserId) -> Capability {
    match directory.resolve_capability(uid).await {
        Ok(cap) => cap,
        Err(e) => {
            warn!(%uid, error = %e, "directory: capability lookup failed, denying delete");
            Capability::default()
        }
    }
}

// =============================================================================
// POSTGRES
// =============================================================================

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_role(raw: &str) -> Result<Role, DirectoryError> {
    raw.parse()
        .map_err(|e: crate::wall::model::UnknownRole| DirectoryError::InvalidProfile(e.to_string()))
}

fn identity_from_row(row: &PgRow) -> Result<Identity, DirectoryError> {
    let role: String = row.get("role");
    Ok(Identity {
        uid: row.get("id"),
        display_name: row.get("display_name"),
        email: row.get("email"),
        role: parse_role(&role)?,
    })
}

/// Load the identity for a user id.
///
/// # Errors
///
/// Returns a database error if the query fails, or `InvalidProfile` if the
/// stored role is unknown.
pub async fn load_identity(pool: &PgPool, uid: Uuid) -> Result<Option<Identity>, DirectoryError> {
    let row = sqlx::query(
        r"SELECT u.id,
                 COALESCE(p.display_name, u.name) AS display_name,
                 u.email,
                 COALESCE(p.role, 'member') AS role
          FROM users u
          LEFT JOIN profiles p ON p.user_id = u.id
          WHERE u.id = $1",
    )
    .bind(uid)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(identity_from_row).transpose()
}

#[async_trait::async_trait]
impl Directory for PgDirectory {
    /// Burns the ticket and loads its identity in one statement.
    async fn identify(&self, ticket: &str) -> Result<Option<Identity>, DirectoryError> {
        let row = sqlx::query(
            r"WITH redeemed AS (
                  DELETE FROM ws_tickets
                  WHERE ticket = $1 AND expires_at > now()
                  RETURNING user_id
              )
              SELECT u.id,
                     COALESCE(p.display_name, u.name) AS display_name,
                     u.email,
                     COALESCE(p.role, 'member') AS role
              FROM redeemed r
              JOIN users u ON u.id = r.user_id
              LEFT JOIN profiles p ON p.user_id = u.id",
        )
        .bind(ticket)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(identity_from_row).transpose()
    }

    async fn resolve_capability(&self, uid: UserId) -> Result<Capability, DirectoryError> {
        let row = sqlx::query("SELECT role, can_delete FROM profiles WHERE user_id = $1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(DirectoryError::ProfileNotFound(uid));
        };

        let role: String = row.get("role");
        Ok(Capability::for_profile(parse_role(&role)?, row.get("can_delete")))
    }
}

#[cfg(test)]
#[path = "directory_test.rs"]
mod tests;
