//! Songdl Core Library
//!
//! This library provides the batch download engine behind the `songdl` tool:
//! a bounded worker pool that drains a queue of track download jobs, retries
//! flaky downloads with linear backoff, and keeps a live progress ledger that
//! callers can query while the batch runs.
//!
//! # Architecture
//!
//! - [`batch`] - Job queue, worker pool, retry policy and progress tracking
//!
//! The actual download/transcode step is an external collaborator reached
//! through the [`TrackDownloader`] trait.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;

// Re-export commonly used types
pub use batch::{
    AudioFormat, BatchConfig, BatchDownloader, BatchError, BatchSummary, BlockingDownloader,
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_QUEUE_CAPACITY, DEFAULT_RESULT_CAPACITY,
    DEFAULT_RETRY_DELAY, DownloadError, DownloadExhaustedError, DownloadJob, DownloadResult,
    DownloadStatus, FailedTrack, ParseFormatError, ProgressStats, ProgressTracker, RetryDecision,
    RetryPolicy, Track, TrackDownloader, TrackProgress, sanitize_file_name,
};
