//! Exit code logic for the songdl process.
//!
//! Single responsibility: map completion/failure counts to the process exit outcome.

use crate::ProcessExit;

/// Determines the process exit outcome from completed and unsuccessful track counts.
///
/// `unsuccessful` covers failed tracks as well as tracks that never ran
/// (dropped at enqueue time or left behind by cancellation).
pub(crate) fn determine_exit_outcome(completed: usize, unsuccessful: usize) -> ProcessExit {
    if unsuccessful == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
