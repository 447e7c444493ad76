//! Error types for session establishment.

use thiserror::Error;

use super::CaptureError;
use crate::redeem::RedeemError;

/// Errors that can occur while establishing a verified session.
///
/// Every variant is fatal for the run; there is no automatic retry.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The operator aborted the login (empty input or end of input).
    #[error("login cancelled: {reason}")]
    LoginCancelled {
        /// What ended the login prompt.
        reason: String,
    },

    /// The storefront did not accept the freshly captured session.
    #[error("[AUTH] login rejected: {reason}\n  Suggestion: {suggestion}")]
    LoginRejected {
        /// Why the session was rejected.
        reason: String,
        /// User-facing hint for recovering.
        suggestion: &'static str,
    },

    /// The session check could not reach the storefront.
    #[error("could not verify the new session: {0}")]
    Verification(#[source] RedeemError),

    /// The captured cookie export could not be used.
    #[error("invalid cookie export: {0}")]
    Capture(#[from] CaptureError),

    /// Reading operator input failed.
    #[error("failed to read login input: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Creates a cancellation error.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::LoginCancelled {
            reason: reason.into(),
        }
    }

    /// Creates a rejection error with the standard re-login hint.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::LoginRejected {
            reason: reason.into(),
            suggestion: "Log in to the storefront in your browser (including the second-factor code), then export the cookies again.",
        }
    }

    /// Returns true when the operator chose to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::LoginCancelled { .. })
    }
}
