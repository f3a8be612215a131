//! Prayer request records and the identity types the wall reasons about.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ledger-assigned request identifier.
pub type RequestId = Uuid;

/// Directory-assigned identity identifier.
pub type UserId = Uuid;

// =============================================================================
// PRAYER REQUEST
// =============================================================================

/// A stored prayer request. Mirrors the `prayer_requests` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerRequest {
    pub id: RequestId,
    pub title: String,
    pub body: String,
    /// Name typed by the submitter. May be empty; "Anonymous" is applied at
    /// render time only.
    pub author_label: String,
    pub owner_id: UserId,
    /// Milliseconds since Unix epoch. `None` while the write is pending.
    pub created_at: Option<i64>,
    pub prayer_count: u32,
    pub prayed_by: BTreeSet<UserId>,
}

impl PrayerRequest {
    #[must_use]
    pub fn has_prayed(&self, uid: UserId) -> bool {
        self.prayed_by.contains(&uid)
    }
}

/// Fields of a request before the ledger assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPrayerRequest {
    pub title: String,
    pub body: String,
    pub author_label: String,
    pub owner_id: UserId,
}

/// Raw form input as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl RequestDraft {
    /// Trim and validate the draft. `None` when title or body is blank.
    #[must_use]
    pub fn validate(&self, owner_id: UserId) -> Option<NewPrayerRequest> {
        let title = self.title.trim();
        let body = self.body.trim();
        if title.is_empty() || body.is_empty() {
            return None;
        }
        Some(NewPrayerRequest {
            title: title.to_owned(),
            body: body.to_owned(),
            author_label: self.name.trim().to_owned(),
            owner_id,
        })
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    #[default]
    Member,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// A signed-in user as resolved by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: UserId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
}

impl Identity {
    /// Display label: name, then email, then a generic marker.
    #[must_use]
    pub fn label(&self) -> &str {
        [self.display_name.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or("Signed in")
    }
}

/// What the current identity may do beyond the member baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capability {
    pub can_delete: bool,
}

impl Capability {
    /// Owners can always delete; other roles need the profile override.
    #[must_use]
    pub fn for_profile(role: Role, delete_override: bool) -> Self {
        Self { can_delete: role == Role::Owner || delete_override }
    }
}
