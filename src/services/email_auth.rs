//! Email access-code auth service.
//!
//! Creates and verifies short-lived six-character codes linked to an email.
//! Unknown addresses may only sign up with the configured invite code; the
//! first request creates the user and a `member` profile. The configured
//! owner address signs up without an invite and gets the `owner` role.

use rand::Rng;
use resend_rs::Resend;
use resend_rs::types::CreateEmailBaseOptions;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::wall::model::Role;

const CODE_LEN: usize = 6;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MAX_FAILED_ATTEMPTS: i32 = 5;
const ACCESS_CODE_TEMPLATE: &str = include_str!("../../templates/access_code.html");

#[derive(Debug, thiserror::Error)]
pub enum EmailAuthError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("invalid code")]
    InvalidCode,
    #[error("a valid invite code is required to sign up")]
    InviteRequired,
    #[error("expired or incorrect code")]
    VerificationFailed,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("email delivery failed: {0}")]
    EmailDelivery(String),
}

/// Resend credentials for access-code delivery.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: String,
    pub from: String,
}

impl EmailConfig {
    /// Load from `RESEND_API_KEY` and `RESEND_FROM`. Both must be set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("RESEND_API_KEY").ok().filter(|v| !v.trim().is_empty())?;
        let from = std::env::var("RESEND_FROM").ok().filter(|v| !v.trim().is_empty())?;
        Some(Self { api_key, from })
    }
}

/// Who may create an account, and which address becomes the wall owner.
#[derive(Debug, Clone, Default)]
pub struct SignUpPolicy {
    /// `None` closes sign-up for everyone but the owner.
    pub invite_code: Option<String>,
    /// Normalized address that signs up as `owner`.
    pub owner_email: Option<String>,
}

impl SignUpPolicy {
    /// Load from `INVITE_CODE` and `OWNER_EMAIL`. Blank or malformed values
    /// count as unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            invite_code: std::env::var("INVITE_CODE").ok().filter(|v| !v.trim().is_empty()),
            owner_email: std::env::var("OWNER_EMAIL").ok().and_then(|v| normalize_email(&v)),
        }
    }

    fn is_owner(&self, email: &str) -> bool {
        self.owner_email.as_deref() == Some(email)
    }

    /// Whether a new account for normalized `email` may be created.
    #[must_use]
    pub fn admits(&self, email: &str, offered_invite: Option<&str>) -> bool {
        self.is_owner(email) || invite_accepted(self.invite_code.as_deref(), offered_invite)
    }

    /// Role given to a new account for normalized `email`.
    #[must_use]
    pub fn role_for(&self, email: &str) -> Role {
        if self.is_owner(email) { Role::Owner } else { Role::Member }
    }
}

/// Sign-up details sent alongside a code request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignUp<'a> {
    pub display_name: Option<&'a str>,
    pub invite_code: Option<&'a str>,
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        return None;
    }
    let parts = normalized.split('@').collect::<Vec<_>>();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return None;
    }
    Some(normalized)
}

#[must_use]
pub fn normalize_code(code: &str) -> Option<String> {
    let normalized = code.trim().to_ascii_uppercase();
    if normalized.len() != CODE_LEN
        || !normalized
            .chars()
            .all(|c| CODE_ALPHABET.contains(&(c as u8)))
    {
        return None;
    }
    Some(normalized)
}

#[must_use]
pub fn generate_access_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

#[must_use]
pub fn hash_access_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    let bytes = hasher.finalize();
    bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
}

/// Whether `offered` matches the configured invite. No configured invite
/// means sign-up is closed.
#[must_use]
pub fn invite_accepted(expected: Option<&str>, offered: Option<&str>) -> bool {
    match (expected.map(str::trim), offered.map(str::trim)) {
        (Some(expected), Some(offered)) => !expected.is_empty() && expected == offered,
        _ => false,
    }
}

/// Display name for a new account: the supplied name, else the local part
/// of the email.
fn sign_up_name(email: &str, display_name: Option<&str>) -> String {
    if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_owned();
    }
    email
        .split('@')
        .next()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("member")
        .to_owned()
}

/// Issue a fresh access code for `email`, creating the account first when
/// the address is new and `policy` admits it.
///
/// # Errors
///
/// `InvalidEmail`, `InviteRequired` for an unknown address the policy does
/// not admit, or a database error.
pub async fn request_access_code(
    pool: &PgPool,
    email: &str,
    sign_up: SignUp<'_>,
    policy: &SignUpPolicy,
) -> Result<String, EmailAuthError> {
    let normalized = normalize_email(email).ok_or(EmailAuthError::InvalidEmail)?;

    let existing = sqlx::query("SELECT id FROM users WHERE email = $1")
        .bind(&normalized)
        .fetch_optional(pool)
        .await?;

    if existing.is_none() {
        if !policy.admits(&normalized, sign_up.invite_code) {
            return Err(EmailAuthError::InviteRequired);
        }
        create_member(pool, &normalized, sign_up, policy.role_for(&normalized)).await?;
    }

    sqlx::query("DELETE FROM email_login_codes WHERE email = $1 AND consumed_at IS NULL")
        .bind(&normalized)
        .execute(pool)
        .await?;

    let code = generate_access_code();
    let code_hash = hash_access_code(&code);

    sqlx::query("INSERT INTO email_login_codes (email, code_hash) VALUES ($1, $2)")
        .bind(&normalized)
        .bind(code_hash)
        .execute(pool)
        .await?;

    Ok(code)
}

async fn create_member(pool: &PgPool, email: &str, sign_up: SignUp<'_>, role: Role) -> Result<Uuid, EmailAuthError> {
    let name = sign_up_name(email, sign_up.display_name);
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r"INSERT INTO users (email, name)
          VALUES ($1, $2)
          ON CONFLICT (email) DO UPDATE SET name = users.name
          RETURNING id",
    )
    .bind(email)
    .bind(&name)
    .fetch_one(&mut *tx)
    .await?;
    let user_id: Uuid = row.get("id");

    sqlx::query(
        r"INSERT INTO profiles (user_id, display_name, email, role, invite_code)
          VALUES ($1, $2, $3, $4, $5)
          ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(&name)
    .bind(email)
    .bind(role.to_string())
    .bind(sign_up.invite_code.map(str::trim))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(%user_id, %role, "email auth: member signed up");
    Ok(user_id)
}

/// Verify a code and return the user it signs in.
///
/// # Errors
///
/// `InvalidEmail`/`InvalidCode` for malformed input, `VerificationFailed`
/// for a wrong, expired, or burned code.
pub async fn verify_access_code(pool: &PgPool, email: &str, code: &str) -> Result<Uuid, EmailAuthError> {
    let normalized_email = normalize_email(email).ok_or(EmailAuthError::InvalidEmail)?;
    let normalized_code = normalize_code(code).ok_or(EmailAuthError::InvalidCode)?;
    let code_hash = hash_access_code(&normalized_code);

    let update = sqlx::query(
        r"UPDATE email_login_codes
          SET consumed_at = now()
          WHERE id = (
              SELECT id
              FROM email_login_codes
              WHERE email = $1
                AND consumed_at IS NULL
                AND expires_at > now()
              ORDER BY created_at DESC
              LIMIT 1
          )
          AND code_hash = $2
          RETURNING id",
    )
    .bind(&normalized_email)
    .bind(&code_hash)
    .fetch_optional(pool)
    .await?;

    if update.is_none() {
        // Count the miss; the fifth one burns the code.
        sqlx::query(
            r"UPDATE email_login_codes
              SET attempts = attempts + 1,
                  consumed_at = CASE WHEN attempts + 1 >= $2 THEN now() ELSE consumed_at END
              WHERE id = (
                  SELECT id
                  FROM email_login_codes
                  WHERE email = $1
                    AND consumed_at IS NULL
                    AND expires_at > now()
                  ORDER BY created_at DESC
                  LIMIT 1
              )",
        )
        .bind(&normalized_email)
        .bind(MAX_FAILED_ATTEMPTS)
        .execute(pool)
        .await?;
        return Err(EmailAuthError::VerificationFailed);
    }

    let user_row = sqlx::query("SELECT id FROM users WHERE email = $1")
        .bind(&normalized_email)
        .fetch_optional(pool)
        .await?;

    let Some(user_row) = user_row else {
        return Err(EmailAuthError::VerificationFailed);
    };

    Ok(user_row.get("id"))
}

/// Deliver an access code through Resend.
///
/// # Errors
///
/// Returns `EmailDelivery` if Resend rejects the message.
pub async fn send_access_code_email(config: &EmailConfig, to_email: &str, code: &str) -> Result<(), EmailAuthError> {
    let resend = Resend::new(&config.api_key);
    let to = [to_email];
    let subject = "Your Prayer Wall access code";
    let html = render_access_code_template(to_email, code);

    let email = CreateEmailBaseOptions::new(&config.from, to, subject).with_html(&html);
    resend
        .emails
        .send(email)
        .await
        .map_err(|e| EmailAuthError::EmailDelivery(e.to_string()))?;
    Ok(())
}

#[must_use]
pub fn render_access_code_template(email: &str, code: &str) -> String {
    ACCESS_CODE_TEMPLATE
        .replace("{{EMAIL}}", email)
        .replace("{{CODE}}", code)
}

#[cfg(test)]
#[path = "email_auth_test.rs"]
mod tests;
