//! Classification of storefront result codes.
//!
//! The storefront reports why a key was not redeemed with a numeric
//! `purchase_result_details` code. This module maps each code to the
//! storefront's own message and to how the engine should react.
//! It is the only place user-facing redemption messages live.

/// How the engine treats a failed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// The key is resolved; move on to the next one.
    Terminal,
    /// The account is throttled; wait and retry the same key.
    RateLimited,
}

/// A result code with its fixed message and retry class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorTaxonomyEntry {
    /// The code this entry was classified from.
    pub code: i64,
    /// Storefront wording shown to the operator.
    pub message: &'static str,
    /// What the engine does next.
    pub retry_class: RetryClass,
}

impl ErrorTaxonomyEntry {
    /// Returns true for the throttling code.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.retry_class == RetryClass::RateLimited
    }
}

/// Product already owned by the account.
pub const ALREADY_OWNED_CODE: i64 = 9;
/// Product not sold in the account's country.
pub const REGION_LOCKED_CODE: i64 = 13;
/// Key is malformed or unknown.
pub const INVALID_KEY_CODE: i64 = 14;
/// Key was already redeemed by another account.
pub const ALREADY_REDEEMED_CODE: i64 = 15;
/// Key needs a base product first.
pub const MISSING_BASE_PRODUCT_CODE: i64 = 24;
/// Key needs a prior activation on a PlayStation 3.
pub const PS3_ACTIVATION_CODE: i64 = 36;
/// Too many recent activation attempts.
pub const RATE_LIMITED_CODE: i64 = 53;

const ALREADY_OWNED_MESSAGE: &str = "This Steam account already owns the product(s) contained in this offer. To access them, visit your library in the Steam client.";

const REGION_LOCKED_MESSAGE: &str = "Sorry, but this product is not available for purchase in this country. Your product key has not been redeemed.";

const INVALID_KEY_MESSAGE: &str = "The product code you've entered is not valid. Please double check to see if you've mistyped your key. I, L, and 1 can look alike, as can V and Y, and 0 and O.";

const ALREADY_REDEEMED_MESSAGE: &str = "The product code you've entered has already been activated by a different Steam account. This code cannot be used again. Please contact the retailer or online seller where the code was purchased for assistance.";

const MISSING_BASE_PRODUCT_MESSAGE: &str = "The product code you've entered requires ownership of another product before activation.\n\nIf you are trying to activate an expansion pack or downloadable content, please first activate the original game, then activate this additional content.";

const PS3_ACTIVATION_MESSAGE: &str = "The product code you have entered requires that you first play this game on the PlayStation®3 system before it can be registered.\n\nPlease:\n\n- Start this game on your PlayStation®3 system\n\n- Link your Steam account to your PlayStation®3 Network account\n\n- Connect to Steam while playing this game on the PlayStation®3 system\n\n- Register this product code through Steam.";

const RATE_LIMITED_MESSAGE: &str = "There have been too many recent activation attempts from this account or Internet address. Please wait and try your product code again later.";

const UNEXPECTED_MESSAGE: &str = "An unexpected error has occurred.  Your product code has not been redeemed.  Please wait 30 minutes and try redeeming the code again.  If the problem persists, please contact Steam Support (https://help.steampowered.com/en/wizard/HelpWithCDKey) for further assistance.";

/// Maps a result code to its taxonomy entry. Unknown codes get the
/// "unexpected error" entry.
#[must_use]
pub fn classify(code: i64) -> ErrorTaxonomyEntry {
    let (message, retry_class) = match code {
        ALREADY_OWNED_CODE => (ALREADY_OWNED_MESSAGE, RetryClass::Terminal),
        REGION_LOCKED_CODE => (REGION_LOCKED_MESSAGE, RetryClass::Terminal),
        INVALID_KEY_CODE => (INVALID_KEY_MESSAGE, RetryClass::Terminal),
        ALREADY_REDEEMED_CODE => (ALREADY_REDEEMED_MESSAGE, RetryClass::Terminal),
        MISSING_BASE_PRODUCT_CODE => (MISSING_BASE_PRODUCT_MESSAGE, RetryClass::Terminal),
        PS3_ACTIVATION_CODE => (PS3_ACTIVATION_MESSAGE, RetryClass::Terminal),
        RATE_LIMITED_CODE => (RATE_LIMITED_MESSAGE, RetryClass::RateLimited),
        _ => (UNEXPECTED_MESSAGE, RetryClass::Terminal),
    };
    ErrorTaxonomyEntry {
        code,
        message,
        retry_class,
    }
}

/// Applies the storefront's "no detail" convention: an absent code, or `0`,
/// means the account was throttled.
#[must_use]
pub fn normalize_error_code(code: Option<i64>) -> i64 {
    match code {
        None | Some(0) => RATE_LIMITED_CODE,
        Some(code) => code,
    }
}
