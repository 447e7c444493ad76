//! Exit code logic for the redeemer process.
//!
//! Single responsibility: map redeemed/failed key counts to the process exit outcome.

use crate::ProcessExit;

/// Determines the process exit outcome from redeemed and failed key counts.
pub(crate) fn determine_exit_outcome(redeemed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if redeemed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
