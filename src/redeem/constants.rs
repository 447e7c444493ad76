//! Constants for the redemption module (endpoints, headers, timeouts).

use std::time::Duration;

/// Default storefront base URL.
pub const DEFAULT_STOREFRONT_URL: &str = "https://store.steampowered.com/";

/// Redemption endpoint, relative to the storefront base.
pub const REGISTER_KEY_API_PATH: &str = "account/ajaxregisterkey/";

/// Key registration page used to check whether a session is logged in.
pub const REGISTER_KEY_PAGE_PATH: &str = "account/registerkey";

/// `Accept` header the storefront's own key page sends.
pub const REDEEM_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-request timeout (60 seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default rate-limit wait tick.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Default elapsed wait between rate-limit retries.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);
