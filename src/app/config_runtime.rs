use std::path::PathBuf;
use std::time::Duration;

use songdl_core::{
    AudioFormat, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, RetryPolicy,
};

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::Args;

pub(crate) const DEFAULT_OUTPUT_DIR: &str = "downloads";
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Effective run settings after merging CLI flags over the config file.
#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub(crate) output_dir: PathBuf,
    pub(crate) format: AudioFormat,
    pub(crate) concurrency: usize,
    pub(crate) retry_policy: RetryPolicy,
    /// `None` when the deadline is disabled.
    pub(crate) timeout: Option<Duration>,
    pub(crate) yt_dlp: Option<PathBuf>,
    pub(crate) metadata: bool,
    pub(crate) debug: bool,
    pub(crate) quiet: bool,
    pub(crate) verbose: u8,
}

/// CLI values win; the file fills anything left unset; built-in defaults cover the rest.
pub(crate) fn resolve_settings(args: &Args, file_config: Option<&FileConfig>) -> RunSettings {
    let file = file_config.cloned().unwrap_or_default();

    let max_retries = args
        .max_retries
        .or(file.max_retries)
        .map_or(DEFAULT_MAX_RETRIES, u32::from);
    let base_delay = args
        .retry_delay_ms
        .or(file.retry_delay_ms)
        .map_or(DEFAULT_RETRY_DELAY, Duration::from_millis);
    let timeout_secs = args
        .timeout_secs
        .or(file.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    let (quiet, debug, verbose) = if args.quiet || args.debug || args.verbose > 0 {
        (args.quiet, args.debug, args.verbose)
    } else {
        match file.verbosity {
            Some(VerbositySetting::Quiet) => (true, false, 0),
            Some(VerbositySetting::Verbose) => (false, false, 1),
            Some(VerbositySetting::Debug) => (false, true, 0),
            Some(VerbositySetting::Default) | None => (false, false, 0),
        }
    };

    RunSettings {
        output_dir: args
            .output_dir
            .clone()
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        format: args.format.or(file.format).unwrap_or_default(),
        concurrency: args
            .concurrency
            .or(file.concurrency)
            .map_or(DEFAULT_CONCURRENCY, usize::from),
        retry_policy: RetryPolicy::new(max_retries, base_delay),
        timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        yt_dlp: args.yt_dlp.clone().or(file.yt_dlp_path),
        metadata: args.metadata,
        debug,
        quiet,
        verbose,
    }
}

pub(crate) fn resolve_default_log_level(settings: &RunSettings) -> &'static str {
    if settings.quiet {
        "error"
    } else if settings.debug {
        "debug"
    } else {
        match settings.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Explicit verbosity flags beat `RUST_LOG`.
pub(crate) fn should_force_cli_log_level(args: &Args) -> bool {
    args.quiet || args.debug || args.verbose > 0
}
