use std::fs;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::Parser;
use songdl_core::{
    BatchConfig, BatchDownloader, DEFAULT_QUEUE_CAPACITY, DEFAULT_RESULT_CAPACITY, DownloadJob,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::progress_manager::{self, ManifestSink, ReporterOptions};
use crate::app::{config_runtime, exit_handler, input_processor, terminal};
use crate::app_config::load_default_file_config;
use crate::cli::Args;
use crate::manifest::Manifest;
use crate::ytdlp::{self, ReleaseAge, YtDlpDownloader};
use crate::{ProcessExit, output, tracklist};

pub(crate) async fn run_songdl() -> Result<ProcessExit> {
    let args = Args::parse();
    let loaded_config = load_default_file_config()?;
    let settings = config_runtime::resolve_settings(&args, loaded_config.config.as_ref());

    terminal::init_tracing(
        config_runtime::resolve_default_log_level(&settings),
        config_runtime::should_force_cli_log_level(&args),
        terminal::is_no_color_requested(),
    );
    debug!(?args, "CLI arguments parsed");
    if loaded_config.config.is_some()
        && let Some(path) = &loaded_config.path
    {
        debug!(path = %path.display(), "Loaded config file");
    }

    let input = input_processor::process_input(args.tracks.as_deref())?;
    let Some(raw) = input.text else {
        output::print_quick_start_guidance(input.piped_stdin_was_empty);
        return Ok(ProcessExit::Success);
    };

    let mut collection = tracklist::parse_track_list(&raw)?;
    for duplicate in collection.remove_duplicate_tracks() {
        warn!(
            track_id = %duplicate.id,
            track = %duplicate.label(),
            "Skipping duplicate track"
        );
    }
    if collection.tracks.is_empty() {
        bail!("No tracks found in track list");
    }
    let total = collection.tracks.len();

    let downloader = YtDlpDownloader::locate(settings.yt_dlp.as_deref())
        .context("yt-dlp is required: install it (https://github.com/yt-dlp/yt-dlp) or pass --yt-dlp")?;
    match downloader.version().await {
        Some(version) => {
            debug!(program = %downloader.program().display(), %version, "Using yt-dlp");
            check_release_age(&version, Local::now().date_naive())?;
        }
        None => warn!(program = %downloader.program().display(), "Could not determine yt-dlp version"),
    }
    if settings.format == songdl_core::AudioFormat::Mp4 && !downloader.has_ffmpeg() {
        warn!("ffmpeg not found in PATH; mp4 downloads will fail");
    }

    if !settings.output_dir.exists() {
        fs::create_dir_all(&settings.output_dir).with_context(|| {
            format!(
                "Failed to create output directory '{}'",
                settings.output_dir.display()
            )
        })?;
        info!(dir = %settings.output_dir.display(), "Created output directory");
    }

    let manifest = settings.metadata.then(|| {
        let manifest = Manifest::from_collection(&collection);
        if let Err(error) = manifest.save(&settings.output_dir) {
            warn!(error = %format!("{error:#}"), "Failed to save metadata");
        }
        ManifestSink {
            manifest,
            output_dir: settings.output_dir.clone(),
        }
    });

    if !settings.quiet {
        println!("{}", collection.headline());
    }

    let config = BatchConfig {
        concurrency: settings.concurrency,
        queue_capacity: total.max(DEFAULT_QUEUE_CAPACITY),
        result_capacity: DEFAULT_RESULT_CAPACITY,
        retry_policy: settings.retry_policy.clone(),
    };
    let mut batch = BatchDownloader::with_config(config, Arc::new(downloader));
    let results = batch
        .take_results()
        .context("Result stream was already taken")?;
    let progress = batch.progress();

    let cancel = CancellationToken::new();
    let interrupted = spawn_interrupt_watch(cancel.clone());
    let timed_out = spawn_deadline(cancel.clone(), settings.timeout);

    batch.start(cancel.clone())?;

    if !settings.quiet {
        println!("\nQueuing {total} tracks for download...");
    }
    let mut dropped = 0_usize;
    for (i, track) in collection.tracks.into_iter().enumerate() {
        let job = DownloadJob::new(track, settings.format, &settings.output_dir, i + 1)
            .with_debug(settings.debug);
        if let Err(error) = batch.queue_download(job) {
            warn!(index = i + 1, error = %error, "Failed to queue track");
            dropped += 1;
        }
    }
    if !settings.quiet {
        println!(
            "Starting downloads with {} workers...\n",
            batch.concurrency()
        );
    }

    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        settings.quiet,
        terminal::is_dumb_terminal(),
    );
    let reporter = progress_manager::spawn_reporter(
        ReporterOptions {
            use_spinner,
            quiet: settings.quiet,
            total,
        },
        results,
        Arc::clone(&progress),
        manifest,
    );

    batch.close().await;
    if let Err(error) = reporter.await {
        warn!(error = %error, "Result reporter task failed");
    }
    cancel.cancel();

    progress.print_summary();

    let stats = progress.stats();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        not_attempted = stats.pending() + dropped,
        total,
        "Download complete"
    );

    if interrupted.load(Ordering::SeqCst) {
        warn!(
            completed = stats.completed,
            total, "Interrupted before every track finished"
        );
        return Ok(ProcessExit::Failure);
    }
    if timed_out.load(Ordering::SeqCst) && !stats.is_drained() {
        warn!(
            pending = stats.pending(),
            "Batch deadline reached before every track finished"
        );
    }

    Ok(exit_handler::determine_exit_outcome(
        stats.completed,
        stats.failed + stats.pending() + dropped,
    ))
}

/// Fails on a stale `yt-dlp` build and warns about an aging one.
fn check_release_age(version: &str, today: NaiveDate) -> Result<()> {
    match ytdlp::release_age(version, today) {
        ReleaseAge::Stale { months } => bail!(
            "yt-dlp {version} is too old ({months} months). Update it with `yt-dlp -U` or your package manager"
        ),
        ReleaseAge::Aging { months } => {
            warn!(%version, months, "yt-dlp is getting old, consider updating with `yt-dlp -U`");
        }
        ReleaseAge::Current | ReleaseAge::Unknown => {}
    }
    Ok(())
}

/// Cancels the batch on Ctrl-C. The returned flag records that it happened.
fn spawn_interrupt_watch(cancel: CancellationToken) -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    interrupted_signal.store(true, Ordering::SeqCst);
                    warn!("Interrupt received, finishing in-flight downloads");
                    cancel.cancel();
                }
            }
            () = cancel.cancelled() => {}
        }
    });
    interrupted
}

/// Cancels the batch once `timeout` elapses; `None` disables the deadline.
fn spawn_deadline(cancel: CancellationToken, timeout: Option<Duration>) -> Arc<AtomicBool> {
    let timed_out = Arc::new(AtomicBool::new(false));
    let Some(timeout) = timeout else {
        return timed_out;
    };
    let timed_out_signal = Arc::clone(&timed_out);
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(timeout) => {
                timed_out_signal.store(true, Ordering::SeqCst);
                cancel.cancel();
            }
            () = cancel.cancelled() => {}
        }
    });
    timed_out
}
