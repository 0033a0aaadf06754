//! Error types for the batch download engine.
//!
//! Two layers are kept apart: [`DownloadError`] is what a single collaborator
//! call reports, and [`DownloadExhaustedError`] is what a job reports once the
//! retry policy gives up. [`BatchError`] covers synchronous misuse of the
//! engine itself (full queue, lifecycle order).

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by a [`TrackDownloader`](super::TrackDownloader) for one attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A required external program is not installed or not on `PATH`.
    #[error("{tool} not found in PATH")]
    ToolNotFound {
        /// Name of the missing program.
        tool: String,
    },

    /// The external program ran but did not produce the track.
    #[error("{tool} failed for {track}: {message}")]
    ToolFailed {
        /// Name of the program that failed.
        tool: String,
        /// Display label of the track (`artist - name`).
        track: String,
        /// Exit status or other diagnostic text.
        message: String,
    },

    /// File system error while preparing the output location.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Any other collaborator failure.
    #[error("{message}")]
    Other {
        /// Human-readable failure description.
        message: String,
    },
}

impl DownloadError {
    /// Creates a missing-tool error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Creates a tool failure error.
    pub fn tool_failed(
        tool: impl Into<String>,
        track: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            track: track.into(),
            message: message.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a free-form error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Every attempt for a job failed.
///
/// Carried inside the job's [`DownloadResult`](super::DownloadResult); it never
/// escapes into the pool's control flow.
#[derive(Debug, Error)]
#[error("download failed after {attempts} attempts: {source}")]
pub struct DownloadExhaustedError {
    /// Total attempts made, including the first one.
    pub attempts: u32,
    /// Error from the last attempt.
    #[source]
    pub source: DownloadError,
}

/// Errors returned synchronously by [`BatchDownloader`](super::BatchDownloader).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    /// The bounded job queue is at capacity; the job was not accepted.
    #[error("download queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// `start` was called on a pool that is already running.
    #[error("batch downloader already started")]
    AlreadyStarted,

    /// The job queue has been closed; no more work is accepted.
    #[error("batch downloader is closed")]
    Closed,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_download_error_tool_not_found_display() {
        let error = DownloadError::tool_not_found("yt-dlp");
        assert_eq!(error.to_string(), "yt-dlp not found in PATH");
    }

    #[test]
    fn test_download_error_tool_failed_display() {
        let error = DownloadError::tool_failed("yt-dlp", "Daft Punk - Around the World", "exit 1");
        let msg = error.to_string();
        assert!(msg.contains("yt-dlp"), "Expected tool in: {msg}");
        assert!(msg.contains("Daft Punk - Around the World"), "Expected track in: {msg}");
        assert!(msg.contains("exit 1"), "Expected status in: {msg}");
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/out"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/out"), "Expected path in: {msg}");
        assert!(error.source().is_some());
    }

    #[test]
    fn test_exhausted_error_wraps_last_error() {
        let error = DownloadExhaustedError {
            attempts: 4,
            source: DownloadError::other("connection reset"),
        };
        let msg = error.to_string();
        assert_eq!(msg, "download failed after 4 attempts: connection reset");
        assert_eq!(error.source().unwrap().to_string(), "connection reset");
    }

    #[test]
    fn test_batch_error_queue_full_display() {
        let error = BatchError::QueueFull { capacity: 100 };
        assert!(error.to_string().contains("queue is full"));
        assert!(error.to_string().contains("100"));
    }
}
