//! CLI entry point for songdl.

use std::process::ExitCode;

mod app;
mod app_config;
mod cli;
mod manifest;
mod output;
mod tracklist;
mod ytdlp;

/// How the run ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every track downloaded (or there was nothing to do).
    Success,
    /// Some tracks downloaded, others failed or never ran.
    Partial,
    /// Nothing downloaded, the run was interrupted, or setup failed.
    Failure,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Partial => 1,
            Self::Failure => 2,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match app::runtime::run_songdl().await {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::from(ProcessExit::Failure.code())
        }
    }
}
