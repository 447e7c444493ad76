//! The authenticated storefront session.

use std::fmt;
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use url::Url;

use super::{SessionCookie, load_cookies_into_jar};

/// Name of the cookie carrying the storefront's anti-forgery session token.
pub const SESSION_ID_COOKIE: &str = "sessionid";

/// An authenticated storefront session.
///
/// A session is a set of cookies plus the account it belongs to. It is passed
/// explicitly from the authenticator to the engine and on to the client; the
/// client only ever reads it.
#[derive(Clone)]
pub struct Session {
    cookies: Vec<SessionCookie>,
    account: Option<String>,
    verified: bool,
    jar: Arc<Jar>,
}

impl Session {
    /// Creates an unverified session from captured or restored cookies.
    #[must_use]
    pub fn new(cookies: Vec<SessionCookie>, account: Option<String>) -> Self {
        let jar = load_cookies_into_jar(&cookies);
        Self {
            cookies,
            account,
            verified: false,
            jar,
        }
    }

    /// Marks the session as verified against the storefront.
    #[must_use]
    pub(crate) fn into_verified(mut self) -> Self {
        self.verified = true;
        self
    }

    /// Returns all cookies in the session.
    #[must_use]
    pub fn cookies(&self) -> &[SessionCookie] {
        &self.cookies
    }

    /// Returns the account identifier, when known.
    #[must_use]
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Whether the storefront accepted this session on the verification check.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Returns the `sessionid` token the redemption form must echo back.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.cookies
            .iter()
            .find(|cookie| cookie.name == SESSION_ID_COOKIE && !cookie.value().is_empty())
            .map(SessionCookie::value)
    }

    /// Builds the `Cookie` header value for a request to `url`.
    #[must_use]
    pub fn cookie_header(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("account", &self.account)
            .field("cookies", &self.cookies.len())
            .field("verified", &self.verified)
            .finish_non_exhaustive()
    }
}
