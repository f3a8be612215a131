//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own persistence and delivery concerns so the wall and the
//! route handlers stay focused on behavior and protocol translation.

pub mod directory;
pub mod email_auth;
pub mod ledger;
pub mod notify;
pub mod session;

/// Parse an environment variable, falling back to `default` when unset or
/// malformed.
pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
