//! Error types for the redemption client.

use thiserror::Error;

/// Errors that can occur during one redemption attempt or session check.
///
/// Everything except [`RedeemError::SessionInvalid`] is a transport failure:
/// the key is resolved as failed and the run moves on.
#[derive(Debug, Error)]
pub enum RedeemError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error calling {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout calling {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Unexpected HTTP status that does not signal an expired session.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body was not the JSON document the storefront sends.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse {
        /// The URL that returned the body.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The storefront no longer accepts the session.
    #[error("[AUTH] session rejected by the storefront: {reason}")]
    SessionInvalid {
        /// Why the session is considered invalid.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl RedeemError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a session-invalid error.
    pub fn session_invalid(reason: impl Into<String>) -> Self {
        Self::SessionInvalid {
            reason: reason.into(),
        }
    }

    /// Classifies a reqwest send error as timeout or network failure.
    pub(crate) fn from_send(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, error)
        }
    }

    /// Returns true when the session must be re-established.
    #[must_use]
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, Self::SessionInvalid { .. })
    }

    /// Returns true for failures that resolve only the current key.
    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        !self.is_session_invalid()
    }
}
