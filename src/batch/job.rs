//! Job and result values exchanged with the worker pool.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::DownloadExhaustedError;

/// Characters that are invalid in file names on at least one common filesystem.
const INVALID_FILE_NAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Identity of one catalog track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Opaque catalog identifier, unique within a batch.
    pub id: String,
    /// Track title.
    pub name: String,
    /// Primary artist name.
    pub artist_name: String,
    /// Artwork URL; may be empty.
    #[serde(default)]
    pub artwork_url: String,
}

impl Track {
    /// Creates a track identity.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        artist_name: impl Into<String>,
        artwork_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artist_name: artist_name.into(),
            artwork_url: artwork_url.into(),
        }
    }

    /// Human-readable `artist - name` label.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} - {}", self.artist_name, self.name)
    }

    /// File stem downloads of this track are saved under.
    ///
    /// ```
    /// use songdl_core::Track;
    ///
    /// let track = Track::new("1", "Who Are You?", "The Who", "");
    /// assert_eq!(track.file_stem(), "The Who - Who Are You_");
    /// ```
    #[must_use]
    pub fn file_stem(&self) -> String {
        sanitize_file_name(&self.label())
    }
}

/// Replaces characters that are invalid in file names with `_`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if INVALID_FILE_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Target container for a downloaded track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Audio only, MP3.
    #[default]
    Mp3,
    /// Video container with the artwork as the picture track.
    Mp4,
}

impl AudioFormat {
    /// File extension without the leading dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Returned when a string is not a supported [`AudioFormat`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported format: {0} (expected mp3 or mp4)")]
pub struct ParseFormatError(String);

impl FromStr for AudioFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "mp4" => Ok(Self::Mp4),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

/// One track's download request. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    /// Track to download.
    pub track: Track,
    /// Target format.
    pub format: AudioFormat,
    /// Directory the collaborator writes into.
    pub output_dir: PathBuf,
    /// Passed through to the collaborator untouched.
    pub debug: bool,
    /// 1-based position in the caller's list, for display only.
    pub index: usize,
}

impl DownloadJob {
    /// Creates a job with debug output disabled.
    pub fn new(track: Track, format: AudioFormat, output_dir: impl Into<PathBuf>, index: usize) -> Self {
        Self {
            track,
            format,
            output_dir: output_dir.into(),
            debug: false,
            index,
        }
    }

    /// Sets the debug passthrough flag.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Path the track is expected at after a successful download.
    #[must_use]
    pub fn expected_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.track.file_stem(), self.format.extension()))
    }
}

/// Outcome of one job, published on the result stream.
#[derive(Debug)]
pub struct DownloadResult {
    /// The job this result belongs to.
    pub job: DownloadJob,
    /// Path of the downloaded file, or why every attempt failed.
    pub outcome: Result<PathBuf, DownloadExhaustedError>,
    /// Retries used (0 when the first attempt succeeded).
    pub retries: u32,
    /// Wall-clock time from the first attempt to the final outcome.
    pub duration: Duration,
}

impl DownloadResult {
    /// Returns true when the job produced a file.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Path of the downloaded file, if any.
    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        self.outcome.as_ref().ok().map(PathBuf::as_path)
    }

    /// Error of the failed job, if any.
    #[must_use]
    pub fn error(&self) -> Option<&DownloadExhaustedError> {
        self.outcome.as_ref().err()
    }
}
