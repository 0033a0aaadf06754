//! Batch downloader: a bounded job queue drained by a fixed pool of workers.
//!
//! # Concurrency Model
//!
//! - `start` spawns exactly `concurrency` Tokio tasks
//! - All workers share one bounded job queue and one bounded result channel
//! - An idle worker waits on the queue while holding its receiver lock, so
//!   each job is delivered to exactly one worker
//! - A shared [`CancellationToken`] stops workers from taking new jobs,
//!   waiting out backoff, or blocking on a full result channel
//!
//! # Lifecycle
//!
//! ```text
//! new ─► start ─► queue_download* ─► close
//!             take_results / progress at any time
//! ```

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::retry::{RetryFailure, download_with_retry};
use super::{BatchError, DownloadJob, DownloadResult, ProgressTracker, RetryPolicy, TrackDownloader};

/// Default number of workers.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default capacity of the job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default capacity of the result channel.
pub const DEFAULT_RESULT_CAPACITY: usize = 100;

/// Explicit configuration for a [`BatchDownloader`].
///
/// Zero values for `concurrency` or either capacity fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of workers.
    pub concurrency: usize,
    /// Jobs that can wait in the queue before `queue_download` reports it full.
    pub queue_capacity: usize,
    /// Results that can wait unconsumed before workers block on publishing.
    pub result_capacity: usize,
    /// Retry policy applied to every job.
    pub retry_policy: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            result_capacity: DEFAULT_RESULT_CAPACITY,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl BatchConfig {
    /// Default configuration with the given worker count.
    #[must_use]
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }

    fn normalized(self) -> Self {
        fn or_default(value: usize, default: usize) -> usize {
            if value == 0 { default } else { value }
        }
        Self {
            concurrency: or_default(self.concurrency, DEFAULT_CONCURRENCY),
            queue_capacity: or_default(self.queue_capacity, DEFAULT_QUEUE_CAPACITY),
            result_capacity: or_default(self.result_capacity, DEFAULT_RESULT_CAPACITY),
            retry_policy: self.retry_policy,
        }
    }
}

/// Everything a worker task needs, shared by all workers.
#[derive(Clone)]
struct WorkerContext {
    jobs: Arc<Mutex<mpsc::Receiver<DownloadJob>>>,
    results: mpsc::Sender<DownloadResult>,
    downloader: Arc<dyn TrackDownloader>,
    retry_policy: RetryPolicy,
    progress: Arc<ProgressTracker>,
    cancel: CancellationToken,
}

/// Runs a batch of track downloads on a fixed-size worker pool.
///
/// The downloader owns the job queue, the result channel and the
/// [`ProgressTracker`] for the lifetime of one batch.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use songdl_core::{BatchDownloader, BlockingDownloader, DownloadJob};
///
/// let downloader = Arc::new(BlockingDownloader::new(|job: &DownloadJob| Ok(job.expected_path())));
/// let batch = BatchDownloader::new(0, downloader);
/// assert_eq!(batch.concurrency(), 3);
/// ```
pub struct BatchDownloader {
    config: BatchConfig,
    downloader: Arc<dyn TrackDownloader>,
    job_tx: Option<mpsc::Sender<DownloadJob>>,
    job_rx: Arc<Mutex<mpsc::Receiver<DownloadJob>>>,
    result_tx: Option<mpsc::Sender<DownloadResult>>,
    result_rx: Option<mpsc::Receiver<DownloadResult>>,
    progress: Arc<ProgressTracker>,
    workers: Vec<JoinHandle<()>>,
    started: bool,
}

impl BatchDownloader {
    /// Creates a downloader with `concurrency` workers and default settings.
    ///
    /// A concurrency of 0 falls back to [`DEFAULT_CONCURRENCY`].
    #[must_use]
    pub fn new(concurrency: usize, downloader: Arc<dyn TrackDownloader>) -> Self {
        Self::with_config(BatchConfig::with_concurrency(concurrency), downloader)
    }

    /// Creates a downloader from an explicit configuration.
    #[must_use]
    #[instrument(level = "debug", skip(downloader))]
    pub fn with_config(config: BatchConfig, downloader: Arc<dyn TrackDownloader>) -> Self {
        let config = config.normalized();
        let (job_tx, job_rx) = mpsc::channel(config.queue_capacity);
        let (result_tx, result_rx) = mpsc::channel(config.result_capacity);

        debug!(
            concurrency = config.concurrency,
            queue_capacity = config.queue_capacity,
            result_capacity = config.result_capacity,
            max_retries = config.retry_policy.max_retries(),
            "creating batch downloader"
        );

        Self {
            config,
            downloader,
            job_tx: Some(job_tx),
            job_rx: Arc::new(Mutex::new(job_rx)),
            result_tx: Some(result_tx),
            result_rx: Some(result_rx),
            progress: Arc::new(ProgressTracker::new()),
            workers: Vec::new(),
            started: false,
        }
    }

    /// Returns the configured number of workers.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Returns the configured job queue capacity.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity
    }

    /// Returns the retry policy applied to every job.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry_policy
    }

    /// Launches the worker pool.
    ///
    /// Must be called from within a Tokio runtime. Jobs queued before `start`
    /// wait in the queue until the workers come up.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::AlreadyStarted`] on a second call and
    /// [`BatchError::Closed`] after [`close`](Self::close).
    #[instrument(skip(self, cancel), fields(concurrency = self.config.concurrency))]
    pub fn start(&mut self, cancel: CancellationToken) -> Result<(), BatchError> {
        if self.started {
            return Err(BatchError::AlreadyStarted);
        }
        let Some(results) = self.result_tx.clone() else {
            return Err(BatchError::Closed);
        };
        self.started = true;

        let ctx = WorkerContext {
            jobs: Arc::clone(&self.job_rx),
            results,
            downloader: Arc::clone(&self.downloader),
            retry_policy: self.config.retry_policy.clone(),
            progress: Arc::clone(&self.progress),
            cancel,
        };

        self.workers = (0..self.config.concurrency)
            .map(|worker_id| tokio::spawn(worker(worker_id, ctx.clone())))
            .collect();

        info!(workers = self.workers.len(), "worker pool started");
        Ok(())
    }

    /// Adds a job to the queue without blocking.
    ///
    /// On success the job is registered with the progress tracker as queued
    /// before any worker can pick it up.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::QueueFull`] if the queue is at capacity; the job
    /// is dropped and not registered. Returns [`BatchError::Closed`] after
    /// [`close`](Self::close).
    pub fn queue_download(&self, job: DownloadJob) -> Result<(), BatchError> {
        let sender = self.job_tx.as_ref().ok_or(BatchError::Closed)?;
        let permit = sender.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => BatchError::QueueFull {
                capacity: self.config.queue_capacity,
            },
            mpsc::error::TrySendError::Closed(()) => BatchError::Closed,
        })?;

        self.progress
            .queue_track(&job.track.id, &job.track.name, &job.track.artist_name);
        debug!(track_id = %job.track.id, index = job.index, "job queued");
        permit.send(job);
        Ok(())
    }

    /// Hands out the result stream. Returns `None` after the first call.
    ///
    /// Results arrive in completion order, one per finished job. The stream
    /// ends once [`close`](Self::close) has joined every worker.
    pub fn take_results(&mut self) -> Option<mpsc::Receiver<DownloadResult>> {
        self.result_rx.take()
    }

    /// Shared handle to the live progress ledger.
    #[must_use]
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    /// Closes the queue, waits for every worker to exit, then closes the
    /// result stream.
    ///
    /// Without cancellation the workers first drain every queued job, so the
    /// result stream must be consumed concurrently (or be large enough to
    /// hold every result); otherwise a worker blocked on a full result
    /// channel keeps this call from returning.
    #[instrument(skip(self))]
    pub async fn close(&mut self) {
        drop(self.job_tx.take());

        let workers = std::mem::take(&mut self.workers);
        debug!(worker_count = workers.len(), "waiting for workers to exit");
        for handle in workers {
            // Ignore JoinError - a panicked worker must not take the batch down
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked");
            }
        }

        drop(self.result_tx.take());

        let stats = self.progress.stats();
        info!(
            total = stats.total,
            completed = stats.completed,
            failed = stats.failed,
            "batch closed"
        );
    }
}

/// Waits for the next job, or `None` once the queue is closed and empty.
async fn next_job(jobs: &Mutex<mpsc::Receiver<DownloadJob>>) -> Option<DownloadJob> {
    jobs.lock().await.recv().await
}

/// Worker loop: take a job, download it with retries, publish the result.
#[instrument(skip(ctx))]
async fn worker(worker_id: usize, ctx: WorkerContext) {
    debug!("worker started");

    loop {
        let job = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                debug!("worker cancelled");
                return;
            }
            job = next_job(&ctx.jobs) => match job {
                Some(job) => job,
                None => {
                    debug!("job queue closed, worker exiting");
                    return;
                }
            },
        };

        let track_id = job.track.id.clone();
        let started = Instant::now();
        let attempt = download_with_retry(
            ctx.downloader.as_ref(),
            &job,
            &ctx.retry_policy,
            &ctx.progress,
            &ctx.cancel,
        )
        .await;

        let (outcome, retries) = match attempt {
            Ok((path, retries)) => {
                info!(track = %job.track.label(), path = %path.display(), retries, "download completed");
                ctx.progress.mark_completed(&track_id, &path);
                (Ok(path), retries)
            }
            Err(RetryFailure::Exhausted(error)) => {
                warn!(track = %job.track.label(), error = %error, "download failed after all attempts");
                ctx.progress.mark_failed(&track_id, &error);
                let retries = error.attempts.saturating_sub(1);
                (Err(error), retries)
            }
            Err(RetryFailure::Cancelled { retries }) => {
                debug!(track_id = %track_id, retries, "job abandoned on cancellation");
                return;
            }
        };

        let result = DownloadResult {
            job,
            outcome,
            retries,
            duration: started.elapsed(),
        };

        tokio::select! {
            biased;
            sent = ctx.results.send(result) => {
                if sent.is_err() {
                    debug!("result receiver dropped, worker exiting");
                    return;
                }
            }
            () = ctx.cancel.cancelled() => {
                debug!(track_id = %track_id, "cancelled while publishing result");
                return;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::batch::{AudioFormat, BlockingDownloader, DownloadError, DownloadStatus, Track};

    fn ok_downloader() -> Arc<dyn TrackDownloader> {
        Arc::new(BlockingDownloader::new(|job: &DownloadJob| Ok(job.expected_path())))
    }

    fn job(n: usize) -> DownloadJob {
        let track = Track::new(format!("id-{n}"), format!("Song {n}"), "Artist", "");
        DownloadJob::new(track, AudioFormat::Mp3, "/out", n)
    }

    #[test]
    fn test_zero_concurrency_uses_default() {
        let batch = BatchDownloader::new(0, ok_downloader());
        assert_eq!(batch.concurrency(), DEFAULT_CONCURRENCY);
        assert_eq!(batch.queue_capacity(), DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_config_zero_capacities_use_defaults() {
        let config = BatchConfig {
            concurrency: 5,
            queue_capacity: 0,
            result_capacity: 0,
            retry_policy: RetryPolicy::with_max_retries(1),
        };
        let batch = BatchDownloader::with_config(config, ok_downloader());
        assert_eq!(batch.concurrency(), 5);
        assert_eq!(batch.queue_capacity(), DEFAULT_QUEUE_CAPACITY);
        assert_eq!(batch.retry_policy().max_retries(), 1);
    }

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_CONCURRENCY, 3);
        assert_eq!(DEFAULT_QUEUE_CAPACITY, 100);
        assert_eq!(DEFAULT_RESULT_CAPACITY, 100);
    }

    #[test]
    fn test_queue_full_does_not_register_progress() {
        let config = BatchConfig {
            queue_capacity: 2,
            ..BatchConfig::default()
        };
        let batch = BatchDownloader::with_config(config, ok_downloader());

        batch.queue_download(job(1)).unwrap();
        batch.queue_download(job(2)).unwrap();
        let error = batch.queue_download(job(3)).unwrap_err();

        assert_eq!(error, BatchError::QueueFull { capacity: 2 });
        assert_eq!(batch.progress().stats().total, 2);
        assert!(batch.progress().track_progress("id-3").is_none());
        assert_eq!(
            batch.progress().count_by_status(DownloadStatus::Queued),
            2
        );
    }

    #[test]
    fn test_take_results_only_once() {
        let mut batch = BatchDownloader::new(1, ok_downloader());
        assert!(batch.take_results().is_some());
        assert!(batch.take_results().is_none());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut batch = BatchDownloader::new(1, ok_downloader());
        batch.start(CancellationToken::new()).unwrap();
        assert_eq!(
            batch.start(CancellationToken::new()),
            Err(BatchError::AlreadyStarted)
        );
        batch.close().await;
    }

    #[tokio::test]
    async fn test_closed_batch_rejects_work() {
        let mut batch = BatchDownloader::new(1, ok_downloader());
        batch.close().await;

        assert_eq!(batch.queue_download(job(1)), Err(BatchError::Closed));
        assert_eq!(batch.start(CancellationToken::new()), Err(BatchError::Closed));
    }

    #[tokio::test]
    async fn test_jobs_queued_before_start_are_processed() {
        let mut batch = BatchDownloader::new(2, ok_downloader());
        let mut results = batch.take_results().unwrap();

        for n in 1..=3 {
            batch.queue_download(job(n)).unwrap();
        }
        batch.start(CancellationToken::new()).unwrap();
        batch.close().await;

        let mut paths = Vec::new();
        while let Some(result) = results.recv().await {
            paths.push(result.file_path().unwrap().to_path_buf());
        }
        paths.sort();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/out/Artist - Song 1.mp3"),
                PathBuf::from("/out/Artist - Song 2.mp3"),
                PathBuf::from("/out/Artist - Song 3.mp3"),
            ]
        );
        assert!(batch.progress().stats().is_drained());
    }

    #[tokio::test]
    async fn test_failed_job_reports_exhausted_error() {
        let downloader: Arc<dyn TrackDownloader> = Arc::new(BlockingDownloader::new(
            |_: &DownloadJob| Err(DownloadError::other("no match")),
        ));
        let config = BatchConfig {
            concurrency: 1,
            retry_policy: RetryPolicy::new(2, Duration::from_millis(1)),
            ..BatchConfig::default()
        };
        let mut batch = BatchDownloader::with_config(config, downloader);
        let mut results = batch.take_results().unwrap();

        batch.start(CancellationToken::new()).unwrap();
        batch.queue_download(job(1)).unwrap();
        batch.close().await;

        let result = results.recv().await.unwrap();
        assert!(results.recv().await.is_none());
        let error = result.error().unwrap();
        assert_eq!(error.attempts, 3);
        assert_eq!(result.retries, 2);

        let entry = batch.progress().track_progress("id-1").unwrap();
        assert_eq!(entry.status, DownloadStatus::Failed);
        assert_eq!(entry.retry_count, 2);
        assert!(entry.error.unwrap().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_close_without_start_ends_result_stream() {
        let mut batch = BatchDownloader::new(1, ok_downloader());
        let mut results = batch.take_results().unwrap();
        batch.close().await;
        assert!(results.recv().await.is_none());
    }
}
