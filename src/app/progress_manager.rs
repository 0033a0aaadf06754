//! Result reporting and progress UI (spinner) for download runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use songdl_core::{DownloadResult, DownloadStatus, ProgressTracker};
use tokio::sync::mpsc;
use tracing::warn;

use crate::manifest::Manifest;

const SPINNER_REFRESH: Duration = Duration::from_millis(120);

/// Manifest kept in sync with the result stream.
pub(crate) struct ManifestSink {
    pub(crate) manifest: Manifest,
    pub(crate) output_dir: PathBuf,
}

pub(crate) struct ReporterOptions {
    pub(crate) use_spinner: bool,
    pub(crate) quiet: bool,
    /// Number of tracks in the input, used for `[index/total]` labels.
    pub(crate) total: usize,
}

/// Spawns the task that drains the result stream.
///
/// Every result is printed as one ✅/❌ line and recorded in the manifest (saved
/// after each result). While the stream is open a spinner shows live counts
/// from `progress`. The task ends when the stream closes.
pub(crate) fn spawn_reporter(
    options: ReporterOptions,
    results: mpsc::Receiver<DownloadResult>,
    progress: Arc<ProgressTracker>,
    manifest: Option<ManifestSink>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_reporter(options, results, progress, manifest))
}

async fn run_reporter(
    options: ReporterOptions,
    mut results: mpsc::Receiver<DownloadResult>,
    progress: Arc<ProgressTracker>,
    mut manifest: Option<ManifestSink>,
) {
    let spinner = options.use_spinner.then(new_spinner);
    let mut ticker = tokio::time::interval(SPINNER_REFRESH);

    loop {
        tokio::select! {
            received = results.recv() => {
                let Some(result) = received else {
                    break;
                };
                let line = format_result_line(&result, options.total);
                match &spinner {
                    Some(spinner) => spinner.println(line),
                    None if !options.quiet => println!("{line}"),
                    None => {}
                }
                if let Some(sink) = manifest.as_mut() {
                    sink.manifest.record(&result);
                    if let Err(error) = sink.manifest.save(&sink.output_dir) {
                        warn!(error = %format!("{error:#}"), "failed to save metadata");
                    }
                }
            }
            _ = ticker.tick(), if spinner.is_some() => {
                if let Some(spinner) = &spinner {
                    spinner.set_message(spinner_message(&progress));
                }
            }
        }
    }

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
}

fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn spinner_message(progress: &ProgressTracker) -> String {
    let stats = progress.stats();
    let downloading = progress.count_by_status(DownloadStatus::Downloading);
    let retrying = progress.count_by_status(DownloadStatus::Retrying);
    let mut message = format!(
        "[{}/{}] Downloading {downloading}",
        stats.finished(),
        stats.total
    );
    if retrying > 0 {
        message.push_str(&format!(", retrying {retrying}"));
    }
    message.push_str("...");
    message
}

pub(crate) fn format_result_line(result: &DownloadResult, total: usize) -> String {
    let track = &result.job.track;
    match &result.outcome {
        Ok(_) => format!(
            "✅ [{}/{total}] Downloaded: {} - {}",
            result.job.index, track.artist_name, track.name
        ),
        Err(error) => format!(
            "❌ [{}/{total}] Failed: {} - {} ({error})",
            result.job.index, track.artist_name, track.name
        ),
    }
}
