//! User-Agent string for storefront requests.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/redeemer";

/// Default User-Agent for storefront requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("redeemer/{version} (key-redemption-tool; +{PROJECT_UA_URL})")
}
