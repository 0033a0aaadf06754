//! Batch download engine for concurrent track downloads with retry support.
//!
//! This module provides the [`BatchDownloader`], which runs a fixed number of
//! worker tasks over a bounded job queue. Each worker hands its job to a
//! [`TrackDownloader`] collaborator, retries failures according to a
//! [`RetryPolicy`], records every state change in a shared
//! [`ProgressTracker`], and publishes one [`DownloadResult`] per finished job.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use songdl_core::batch::{
//!     AudioFormat, BatchDownloader, BlockingDownloader, DownloadJob, Track,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Arc::new(BlockingDownloader::new(|job: &DownloadJob| {
//!     Ok(job.output_dir.join(format!("{}.mp3", job.track.file_stem())))
//! }));
//! let mut batch = BatchDownloader::new(3, downloader);
//! let mut results = batch.take_results().ok_or("results already taken")?;
//! batch.start(CancellationToken::new())?;
//!
//! let track = Track::new("1440857781", "Blinding Lights", "The Weeknd", "");
//! batch.queue_download(DownloadJob::new(track, AudioFormat::Mp3, PathBuf::from("out"), 1))?;
//!
//! let consumer = tokio::spawn(async move {
//!     while let Some(result) = results.recv().await {
//!         println!("{}: {:?}", result.job.track.name, result.outcome);
//!     }
//! });
//! batch.close().await;
//! consumer.await?;
//! batch.progress().print_summary();
//! # Ok(())
//! # }
//! ```

mod downloader;
mod engine;
mod error;
mod job;
mod progress;
mod retry;

pub use downloader::{BlockingDownloader, TrackDownloader};
pub use engine::{
    BatchConfig, BatchDownloader, DEFAULT_CONCURRENCY, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RESULT_CAPACITY,
};
pub use error::{BatchError, DownloadError, DownloadExhaustedError};
pub use job::{
    AudioFormat, DownloadJob, DownloadResult, ParseFormatError, Track, sanitize_file_name,
};
pub use progress::{
    BatchSummary, DownloadStatus, FailedTrack, ProgressStats, ProgressTracker, TrackProgress,
};
pub use retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, RetryDecision, RetryPolicy};
