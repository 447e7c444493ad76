//! Authentication and session management.
//!
//! A [`Session`] is built from browser-exported storefront cookies
//! (Netscape or JSON), verified against the storefront, and optionally
//! persisted encrypted at rest so later runs can skip the login.

mod authenticator;
mod capture;
mod cookies;
mod error;
mod login;
mod session;
mod storage;

pub use authenticator::{Authenticator, SessionAuthenticator, SessionVerifier};
pub use capture::{CaptureError, CapturedCookieFormat, CapturedCookies, parse_captured_cookies};
pub use cookies::{
    CookieError, ParseResult, SessionCookie, load_cookies_into_jar, parse_netscape_cookies,
};
pub use error::AuthError;
pub use login::{BrowserCookieLogin, LoginFlow};
pub use session::{SESSION_ID_COOKIE, Session};
pub use storage::{
    EncryptedSessionStore, SessionStore, StorageError, default_config_dir, default_session_path,
};
