//! Thread-safe progress ledger for a batch run.
//!
//! The [`ProgressTracker`] keeps one [`TrackProgress`] entry per queued job
//! plus three aggregate counters. Workers mutate it as jobs move through
//! their states; any task may read it at any time for live reporting.
//!
//! Mutations are serialized by a single write lock. The counters are atomics
//! that only change while that lock is held, so a counter and its ledger
//! entry always move together, while [`ProgressTracker::stats`] can still read
//! them without taking the lock.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, trace};

/// Status of one job in the ledger.
///
/// `Queued → Downloading → (Retrying → Downloading)* → Completed | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Accepted into the queue, no worker has picked it up yet.
    Queued,
    /// An attempt is in flight.
    Downloading,
    /// Waiting out the backoff before the next attempt.
    Retrying,
    /// Terminal: the file was produced.
    Completed,
    /// Terminal: every attempt failed.
    Failed,
}

impl DownloadStatus {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress record for a single job. Readers always get a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackProgress {
    /// Track identifier.
    pub id: String,
    /// Track title.
    pub name: String,
    /// Artist name.
    pub artist: String,
    /// Current status.
    pub status: DownloadStatus,
    /// Downloaded file, set on completion.
    pub file_path: Option<PathBuf>,
    /// Final error, set on failure.
    pub error: Option<String>,
    /// When the first attempt started.
    pub started_at: Option<Instant>,
    /// When the job reached a terminal state.
    pub finished_at: Option<Instant>,
    /// Retries announced so far.
    pub retry_count: u32,
}

impl TrackProgress {
    fn queued(id: &str, name: &str, artist: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            artist: artist.to_string(),
            status: DownloadStatus::Queued,
            file_path: None,
            error: None,
            started_at: None,
            finished_at: None,
            retry_count: 0,
        }
    }

    /// Time between the first attempt and the terminal state, when both are known.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        Some(self.finished_at?.saturating_duration_since(self.started_at?))
    }
}

/// Snapshot of the aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressStats {
    /// Jobs accepted into the queue.
    pub total: usize,
    /// Jobs that produced a file.
    pub completed: usize,
    /// Jobs that exhausted their retries.
    pub failed: usize,
}

impl ProgressStats {
    /// Jobs that reached a terminal state.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    /// Jobs not yet finished. After a cancelled run these were never attempted
    /// or were abandoned mid-retry.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.finished())
    }

    /// Returns true once every accepted job reached a terminal state.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.finished() == self.total
    }
}

/// Failed entry as listed in a [`BatchSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTrack {
    /// Artist name.
    pub artist: String,
    /// Track title.
    pub name: String,
    /// Final error message.
    pub error: String,
}

/// End-of-run report rendered by [`ProgressTracker::print_summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Aggregate counters at the time the summary was taken.
    pub stats: ProgressStats,
    /// Time since the tracker was created.
    pub elapsed: Duration,
    /// Failed jobs, sorted by artist then title.
    pub failures: Vec<FailedTrack>,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========== Download Summary ==========")?;
        writeln!(f, "Total tracks: {}", self.stats.total)?;
        writeln!(f, "Completed: {}", self.stats.completed)?;
        writeln!(f, "Failed: {}", self.stats.failed)?;
        let pending = self.stats.pending();
        if pending > 0 {
            writeln!(f, "Not attempted: {pending}")?;
        }
        writeln!(f, "Duration: {}", format_elapsed(self.elapsed))?;
        write!(f, "======================================")?;

        if !self.failures.is_empty() {
            write!(f, "\n\nFailed downloads:")?;
            for failure in &self.failures {
                write!(f, "\n- {} - {}: {}", failure.artist, failure.name, failure.error)?;
            }
        }
        Ok(())
    }
}

/// Formats a duration rounded to whole seconds, e.g. `1h2m3s`, `4m0s`, `12s`.
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs() + u64::from(elapsed.subsec_millis() >= 500);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Concurrent progress ledger shared by the workers of one batch.
#[derive(Debug)]
pub struct ProgressTracker {
    ledger: RwLock<HashMap<String, TrackProgress>>,
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    created_at: Instant,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Creates an empty tracker; the summary clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ledger: RwLock::new(HashMap::new()),
            total: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            created_at: Instant::now(),
        }
    }

    // Mutations are plain field assignments, so a poisoned ledger is still consistent.
    fn read_ledger(&self) -> RwLockReadGuard<'_, HashMap<String, TrackProgress>> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_ledger(&self) -> RwLockWriteGuard<'_, HashMap<String, TrackProgress>> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a job as queued and increments the total.
    ///
    /// Ids must be unique within a batch. A duplicate silently replaces the
    /// earlier entry while the total still counts both.
    pub(crate) fn queue_track(&self, id: &str, name: &str, artist: &str) {
        let mut ledger = self.write_ledger();
        ledger.insert(id.to_string(), TrackProgress::queued(id, name, artist));
        self.total.fetch_add(1, Ordering::SeqCst);
        trace!(track_id = id, "track queued");
    }

    /// Moves a queued or retrying job to `Downloading`.
    pub(crate) fn start_download(&self, id: &str) {
        let mut ledger = self.write_ledger();
        let Some(entry) = ledger.get_mut(id) else {
            debug!(track_id = id, "start for unknown track ignored");
            return;
        };
        if matches!(entry.status, DownloadStatus::Queued | DownloadStatus::Retrying) {
            entry.status = DownloadStatus::Downloading;
            entry.started_at.get_or_insert_with(Instant::now);
        }
    }

    /// Moves a job to `Retrying` and records the retry number.
    pub(crate) fn update_retry(&self, id: &str, retry: u32, max_retries: u32) {
        let mut ledger = self.write_ledger();
        if let Some(entry) = ledger.get_mut(id)
            && !entry.status.is_terminal()
        {
            entry.status = DownloadStatus::Retrying;
            entry.retry_count = retry;
            trace!(track_id = id, retry, max_retries, "track retrying");
        }
    }

    /// Marks a job completed with the path it was saved to.
    pub(crate) fn mark_completed(&self, id: &str, file_path: &Path) {
        let mut ledger = self.write_ledger();
        if let Some(entry) = ledger.get_mut(id)
            && !entry.status.is_terminal()
        {
            entry.status = DownloadStatus::Completed;
            entry.file_path = Some(file_path.to_path_buf());
            entry.finished_at = Some(Instant::now());
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Marks a job failed with its final error.
    pub(crate) fn mark_failed(&self, id: &str, error: &dyn fmt::Display) {
        let mut ledger = self.write_ledger();
        if let Some(entry) = ledger.get_mut(id)
            && !entry.status.is_terminal()
        {
            entry.status = DownloadStatus::Failed;
            entry.error = Some(error.to_string());
            entry.finished_at = Some(Instant::now());
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Returns the aggregate counters without taking the ledger lock.
    ///
    /// `total` is read last, so `completed + failed <= total` holds for every
    /// snapshot.
    #[must_use]
    pub fn stats(&self) -> ProgressStats {
        let completed = self.completed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let total = self.total.load(Ordering::SeqCst);
        ProgressStats {
            total,
            completed,
            failed,
        }
    }

    /// Returns a copy of one job's record.
    #[must_use]
    pub fn track_progress(&self, id: &str) -> Option<TrackProgress> {
        self.read_ledger().get(id).cloned()
    }

    /// Returns a copy of the whole ledger.
    #[must_use]
    pub fn all_progress(&self) -> HashMap<String, TrackProgress> {
        self.read_ledger().clone()
    }

    /// Number of jobs currently in the given status.
    #[must_use]
    pub fn count_by_status(&self, status: DownloadStatus) -> usize {
        self.read_ledger()
            .values()
            .filter(|entry| entry.status == status)
            .count()
    }

    /// Time since the tracker was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Builds the end-of-run summary.
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        let mut failures: Vec<FailedTrack> = self
            .read_ledger()
            .values()
            .filter(|entry| entry.status == DownloadStatus::Failed)
            .map(|entry| FailedTrack {
                artist: entry.artist.clone(),
                name: entry.name.clone(),
                error: entry.error.clone().unwrap_or_default(),
            })
            .collect();
        failures.sort_by(|a, b| a.artist.cmp(&b.artist).then_with(|| a.name.cmp(&b.name)));

        BatchSummary {
            stats: self.stats(),
            elapsed: self.elapsed(),
            failures,
        }
    }

    /// Prints the summary to stdout.
    pub fn print_summary(&self) {
        println!("\n{}", self.summary());
    }
}
