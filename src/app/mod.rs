//! Application runtime composition modules.

pub(crate) mod config;
pub(crate) mod exit_handler;
pub(crate) mod input;
pub(crate) mod progress;
pub(crate) mod runtime;
pub(crate) mod terminal;
