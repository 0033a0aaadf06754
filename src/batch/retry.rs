//! Retry logic with linear backoff for flaky track downloads.
//!
//! Every collaborator failure is treated the same way: the job is retried up
//! to [`RetryPolicy::max_retries`] times, waiting `base_delay × retry` before
//! retry number `retry`. There is no error classification and no jitter.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use songdl_core::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//!
//! match policy.should_retry(1) {
//!     RetryDecision::Retry { delay, retry } => {
//!         assert_eq!(retry, 1);
//!         assert_eq!(delay, Duration::from_secs(1));
//!     }
//!     RetryDecision::DoNotRetry { reason } => unreachable!("{reason}"),
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{DownloadExhaustedError, DownloadJob, ProgressTracker, TrackDownloader};

/// Default maximum retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff unit (1 second). Retry `n` waits `n` units.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which retry this will be (1-indexed).
        retry: u32,
    },

    /// Give up on the job.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with linear backoff.
///
/// # Default Values
///
/// - `max_retries`: 3 (4 attempts in total)
/// - `base_delay`: 1 second
///
/// # Delay Calculation
///
/// ```text
/// delay(retry) = base_delay * retry
/// ```
///
/// With defaults, delays are 1s, 2s, 3s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    max_retries: u32,

    /// Backoff unit.
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retries after the first attempt (0 disables retrying)
    /// * `base_delay` - Backoff unit; retry `n` waits `n × base_delay`
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Creates a policy with a custom `max_retries`, using the default delay.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Returns the maximum number of retries.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the total number of attempts a job may get.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns the backoff unit.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Determines whether to retry after a failed attempt.
    ///
    /// `attempt` is the attempt that just failed (1-indexed).
    #[instrument(level = "trace", skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if attempt > self.max_retries {
            debug!(attempt, max = self.max_retries, "max retries reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        RetryDecision::Retry {
            delay: self.delay_for(attempt),
            retry: attempt,
        }
    }

    /// Backoff before retry number `retry`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }
}

/// Why [`download_with_retry`] did not produce a file.
#[derive(Debug)]
pub(crate) enum RetryFailure {
    /// Every attempt failed.
    Exhausted(DownloadExhaustedError),
    /// The batch was cancelled while waiting to retry.
    Cancelled {
        /// Retries announced before cancellation.
        retries: u32,
    },
}

/// Downloads one job, retrying failures according to `policy`.
///
/// Progress transitions are recorded on `progress` as they happen:
/// `Downloading` before every attempt, `Retrying` before every backoff. The
/// terminal transition is left to the caller.
///
/// The backoff sleep is abandoned when `cancel` fires. An attempt already in
/// flight is never interrupted.
///
/// # Returns
///
/// - `Ok((PathBuf, u32))` - Path of the downloaded file and retries used
/// - `Err(RetryFailure)` - Exhausted attempts or cancellation during backoff
#[instrument(skip_all, fields(track_id = %job.track.id, index = job.index))]
pub(crate) async fn download_with_retry(
    downloader: &dyn TrackDownloader,
    job: &DownloadJob,
    policy: &RetryPolicy,
    progress: &ProgressTracker,
    cancel: &CancellationToken,
) -> Result<(PathBuf, u32), RetryFailure> {
    let track_id = job.track.id.as_str();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        progress.start_download(track_id);
        debug!(attempt, "attempting download");

        let error = match downloader.download(job).await {
            Ok(path) => return Ok((path, attempt - 1)),
            Err(e) => e,
        };

        match policy.should_retry(attempt) {
            RetryDecision::Retry { delay, retry } => {
                warn!(
                    track = %job.track.label(),
                    retry,
                    max_retries = policy.max_retries(),
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying download"
                );
                progress.update_retry(track_id, retry, policy.max_retries());

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!(retry, "cancelled during backoff");
                        return Err(RetryFailure::Cancelled { retries: retry });
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(%reason, "not retrying download");
                return Err(RetryFailure::Exhausted(DownloadExhaustedError {
                    attempts: attempt,
                    source: error,
                }));
            }
        }
    }
}
