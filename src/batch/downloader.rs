//! The collaborator seam: how the engine asks for one track to be fetched.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::{DownloadError, DownloadJob};

/// Performs the actual download/transcode of one track.
///
/// Implementations receive the job unchanged (format, output directory and
/// debug flag included) and return the path of the produced file. The engine
/// does not interpret errors beyond retrying them, and never inspects the file.
///
/// A call may run for a long time and is not cancelled by the engine; it is
/// awaited to completion even after the batch is cancelled.
#[async_trait]
pub trait TrackDownloader: Send + Sync {
    /// Downloads `job.track` and returns where it was saved.
    async fn download(&self, job: &DownloadJob) -> Result<PathBuf, DownloadError>;
}

/// Adapts a plain blocking function into a [`TrackDownloader`].
///
/// Each call runs on tokio's blocking thread pool, so a slow download never
/// stalls the async workers.
///
/// ```
/// use songdl_core::{BlockingDownloader, DownloadJob};
///
/// let downloader = BlockingDownloader::new(|job: &DownloadJob| Ok(job.expected_path()));
/// # let _ = downloader;
/// ```
pub struct BlockingDownloader<F> {
    download: Arc<F>,
}

impl<F> BlockingDownloader<F>
where
    F: Fn(&DownloadJob) -> Result<PathBuf, DownloadError> + Send + Sync + 'static,
{
    /// Wraps `download`.
    pub fn new(download: F) -> Self {
        Self {
            download: Arc::new(download),
        }
    }
}

#[async_trait]
impl<F> TrackDownloader for BlockingDownloader<F>
where
    F: Fn(&DownloadJob) -> Result<PathBuf, DownloadError> + Send + Sync + 'static,
{
    async fn download(&self, job: &DownloadJob) -> Result<PathBuf, DownloadError> {
        let download = Arc::clone(&self.download);
        let job = job.clone();
        tokio::task::spawn_blocking(move || download(&job))
            .await
            .map_err(|e| DownloadError::other(format!("download task failed: {e}")))?
    }
}
