//! Error taxonomy for wall interactions.

use crate::frame::{ErrorCode, Level};
use crate::services::ledger::LedgerError;

use super::model::RequestId;

pub const MSG_FIELDS_REQUIRED: &str = "Title and details are required.";

/// The user action a write failure happened in; picks the generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Submit,
    Pray,
    Delete,
}

impl WriteAction {
    fn failure_message(self) -> &'static str {
        match self {
            Self::Submit => "Could not submit prayer request. Try again.",
            Self::Pray => "Could not update prayer count. Please try again.",
            Self::Delete => "Could not delete prayer request.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WallError {
    /// Rejected before any network call.
    #[error("{0}")]
    Validation(&'static str),
    #[error("You must be signed in to {0}.")]
    AuthRequired(&'static str),
    #[error("You've already marked that you are praying for this request.")]
    AlreadyPraying(RequestId),
    #[error("Only the site admin can delete prayer requests.")]
    NotPermitted,
    #[error("prayer request not found: {0}")]
    NotFound(RequestId),
    #[error("{}", .action.failure_message())]
    Write {
        action: WriteAction,
        #[source]
        source: LedgerError,
    },
}

impl WallError {
    pub(crate) fn write(action: WriteAction, source: LedgerError) -> Self {
        Self::Write { action, source }
    }
}

impl ErrorCode for WallError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::AuthRequired(_) => "E_AUTH_REQUIRED",
            Self::AlreadyPraying(_) => "E_ALREADY_PRAYING",
            Self::NotPermitted => "E_NOT_PERMITTED",
            Self::NotFound(_) => "E_REQUEST_NOT_FOUND",
            Self::Write { .. } => "E_WRITE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Write { .. })
    }

    fn level(&self) -> Level {
        match self {
            Self::Validation(_) => Level::Inline,
            Self::AuthRequired(_) | Self::NotPermitted => Level::Blocking,
            Self::AlreadyPraying(_) => Level::Warning,
            Self::NotFound(_) | Self::Write { .. } => Level::Error,
        }
    }
}

/// Status text that replaces the list when the subscription fails.
#[must_use]
pub fn subscription_status(err: &LedgerError) -> &'static str {
    if matches!(err, LedgerError::PermissionDenied) {
        "Please sign in (and ensure your profile is set up) to view prayer requests."
    } else {
        "Unable to load prayer requests."
    }
}
