//! CLI entry point for the redeemer tool.

use std::process::ExitCode;

mod app;
mod cli;

/// Process outcome for a redemption run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every key was redeemed (or there was nothing to do).
    Success,
    /// Some keys were redeemed and some failed.
    Partial,
    /// No key was redeemed, or the run aborted.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(outcome: ProcessExit) -> Self {
        match outcome {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Partial => ExitCode::from(2),
            ProcessExit::Failure => ExitCode::FAILURE,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match app::runtime::run_redeemer().await {
        Ok(outcome) => outcome.into(),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
