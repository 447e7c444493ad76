//! Key redemption against the storefront.
//!
//! # Overview
//!
//! - [`StorefrontClient`] submits one key per call and parses the answer
//!   into a [`RedemptionResult`].
//! - [`classify`] maps result codes to the storefront's messages and a
//!   [`RetryClass`].
//! - [`RedemptionEngine`] processes keys in order, waiting out rate limits
//!   and re-authenticating when the session expires.

pub mod constants;
mod client;
mod engine;
mod error;
mod key;
mod response;
mod retry;
mod taxonomy;

pub use client::{Redeemer, StorefrontClient};
pub use constants::{DEFAULT_RETRY_INTERVAL, DEFAULT_STOREFRONT_URL, DEFAULT_TICK};
pub use engine::{EngineError, RedemptionEngine, RedemptionReporter, RedemptionStats};
pub use error::RedeemError;
pub use key::RedemptionKey;
pub use response::RedemptionResult;
pub use retry::{RetryState, Sleeper, TokioSleeper, WaitSchedule, WaitStep};
pub use taxonomy::{
    ErrorTaxonomyEntry, RATE_LIMITED_CODE, RetryClass, classify, normalize_error_code,
};
