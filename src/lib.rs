//! Redeemer Core Library
//!
//! This library provides the core functionality for the redeemer tool,
//! which redeems batches of product keys against a storefront account
//! while surviving the storefront's per-account rate limiting.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`auth`] - Session capture, verification, and encrypted persistence
//! - [`redeem`] - Redemption client, result classification, and the engine

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod redeem;
mod user_agent;

// Re-export commonly used types
pub use auth::{
    AuthError, Authenticator, BrowserCookieLogin, EncryptedSessionStore, Session,
    SessionAuthenticator, SessionStore,
};
pub use redeem::{
    EngineError, RedeemError, RedemptionEngine, RedemptionKey, RedemptionReporter,
    RedemptionResult, RedemptionStats, StorefrontClient, WaitSchedule, classify,
};
