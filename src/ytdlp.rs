//! [`TrackDownloader`] backed by the external `yt-dlp` (and, for mp4, `ffmpeg`) programs.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use songdl_core::{AudioFormat, DownloadError, DownloadJob, Track, TrackDownloader};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

const YT_DLP: &str = "yt-dlp";
const FFMPEG: &str = "ffmpeg";

/// Builds older than this many months are refused.
const MAX_RELEASE_AGE_MONTHS: i32 = 2;

const COMMON_ARGS: [&str; 2] = ["--no-playlist", "--no-warnings"];

const MP3_ARGS: [&str; 7] = [
    "--extract-audio",
    "--audio-format",
    "mp3",
    "--audio-quality",
    "192K",
    "--embed-thumbnail",
    "--add-metadata",
];

const M4A_ARGS: [&str; 8] = [
    "--extract-audio",
    "--audio-format",
    "m4a",
    "--audio-quality",
    "192K",
    "--write-thumbnail",
    "--convert-thumbnails",
    "jpg",
];

const STILL_IMAGE_ARGS: [&str; 11] = [
    "-c:v",
    "libx264",
    "-tune",
    "stillimage",
    "-c:a",
    "aac",
    "-b:a",
    "192k",
    "-pix_fmt",
    "yuv420p",
    "-shortest",
];

/// Searches for a track on YouTube and saves it through `yt-dlp`.
///
/// mp3 downloads are extracted and tagged by `yt-dlp` directly. mp4 downloads
/// fetch m4a audio plus the video thumbnail into a scratch directory and let
/// `ffmpeg` render them into a still-image video.
#[derive(Debug, Clone)]
pub(crate) struct YtDlpDownloader {
    yt_dlp: PathBuf,
    ffmpeg: Option<PathBuf>,
}

impl YtDlpDownloader {
    pub(crate) fn new(yt_dlp: PathBuf, ffmpeg: Option<PathBuf>) -> Self {
        Self { yt_dlp, ffmpeg }
    }

    /// Uses `explicit` when given, otherwise finds `yt-dlp` on `PATH`.
    /// `ffmpeg` is optional and only required for mp4 jobs.
    pub(crate) fn locate(explicit: Option<&Path>) -> Result<Self, DownloadError> {
        let yt_dlp = match explicit {
            Some(path) => path.to_path_buf(),
            None => which::which(YT_DLP).map_err(|_| DownloadError::tool_not_found(YT_DLP))?,
        };
        Ok(Self::new(yt_dlp, which::which(FFMPEG).ok()))
    }

    pub(crate) fn program(&self) -> &Path {
        &self.yt_dlp
    }

    pub(crate) fn has_ffmpeg(&self) -> bool {
        self.ffmpeg.is_some()
    }

    /// `yt-dlp --version`, when the program runs at all.
    pub(crate) async fn version(&self) -> Option<String> {
        let output = Command::new(&self.yt_dlp)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Runs one `yt-dlp` invocation per search query until one succeeds.
    async fn fetch(
        &self,
        job: &DownloadJob,
        template: &Path,
        format_args: &[&str],
    ) -> Result<(), DownloadError> {
        let mut last_failure = String::new();
        for query in search_queries(&job.track) {
            debug!(query = %query, "trying search");
            let status = Command::new(&self.yt_dlp)
                .arg(&query)
                .args(format_args)
                .arg("--output")
                .arg(template)
                .args(COMMON_ARGS)
                .stdin(Stdio::null())
                .stdout(passthrough(job.debug))
                .stderr(passthrough(job.debug))
                .status()
                .await
                .map_err(|e| spawn_error(YT_DLP, &self.yt_dlp, e))?;
            if status.success() {
                return Ok(());
            }
            last_failure = format!("{status} for {query:?}");
        }
        Err(DownloadError::tool_failed(
            YT_DLP,
            job.track.label(),
            format!("every search query failed, last {last_failure} (try --debug for details)"),
        ))
    }

    async fn download_mp4(&self, job: &DownloadJob) -> Result<PathBuf, DownloadError> {
        let ffmpeg = self
            .ffmpeg
            .as_deref()
            .ok_or_else(|| DownloadError::tool_not_found(FFMPEG))?;
        let work_dir = scratch_dir(job);
        fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| DownloadError::io(&work_dir, e))?;

        let outcome = self.render_mp4(job, ffmpeg, &work_dir).await;

        if let Err(error) = fs::remove_dir_all(&work_dir).await {
            warn!(dir = %work_dir.display(), error = %error, "failed to remove scratch directory");
        }
        outcome
    }

    async fn render_mp4(
        &self,
        job: &DownloadJob,
        ffmpeg: &Path,
        work_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        self.fetch(job, &work_dir.join("audio.%(ext)s"), &M4A_ARGS)
            .await?;

        let target = job.expected_path();
        let status = Command::new(ffmpeg)
            .args(["-y", "-loglevel", "error", "-loop", "1", "-i"])
            .arg(work_dir.join("audio.jpg"))
            .arg("-i")
            .arg(work_dir.join("audio.m4a"))
            .args(STILL_IMAGE_ARGS)
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(passthrough(job.debug))
            .stderr(passthrough(job.debug))
            .status()
            .await
            .map_err(|e| spawn_error(FFMPEG, ffmpeg, e))?;
        if !status.success() {
            return Err(DownloadError::tool_failed(
                FFMPEG,
                job.track.label(),
                format!("{status} while rendering {}", target.display()),
            ));
        }
        Ok(target)
    }
}

#[async_trait]
impl TrackDownloader for YtDlpDownloader {
    #[instrument(skip(self, job), fields(track = %job.track.label(), format = %job.format))]
    async fn download(&self, job: &DownloadJob) -> Result<PathBuf, DownloadError> {
        fs::create_dir_all(&job.output_dir)
            .await
            .map_err(|e| DownloadError::io(&job.output_dir, e))?;

        match job.format {
            AudioFormat::Mp3 => {
                let template = job
                    .output_dir
                    .join(format!("{}.%(ext)s", job.track.file_stem()));
                self.fetch(job, &template, &MP3_ARGS).await?;
                Ok(job.expected_path())
            }
            AudioFormat::Mp4 => self.download_mp4(job).await,
        }
    }
}

/// Age of a `yt-dlp` build, judged by its `YYYY.MM.DD` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReleaseAge {
    Current,
    /// At least a month old but still accepted.
    Aging { months: i32 },
    /// Too old to keep up with YouTube.
    Stale { months: i32 },
    /// Not a dated release version.
    Unknown,
}

/// Compares the release date in `version` with `today` in whole calendar months.
/// Nightly suffixes such as `2024.08.06.232821` are ignored.
pub(crate) fn release_age(version: &str, today: NaiveDate) -> ReleaseAge {
    let mut parts = version.trim().splitn(4, '.');
    let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next()) else {
        return ReleaseAge::Unknown;
    };
    if year.len() != 4 {
        return ReleaseAge::Unknown;
    }
    let Ok(released) = NaiveDate::parse_from_str(&format!("{year}.{month}.{day}"), "%Y.%m.%d")
    else {
        return ReleaseAge::Unknown;
    };

    let months = month_index(today) - month_index(released);
    if months > MAX_RELEASE_AGE_MONTHS {
        ReleaseAge::Stale { months }
    } else if months >= 1 {
        ReleaseAge::Aging { months }
    } else {
        ReleaseAge::Current
    }
}

fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + i32::try_from(date.month0()).unwrap_or_default()
}

/// Queries tried in order; lyric videos and auto-generated "topic" uploads
/// tend to carry the studio audio.
fn search_queries(track: &Track) -> [String; 3] {
    let terms = format!("{} {}", track.name, track.artist_name);
    [
        format!("ytsearch1:{terms} lyrics"),
        format!("ytsearch1:{terms} topic"),
        format!("ytsearch1:{terms}"),
    ]
}

/// Per-job scratch directory for the mp4 intermediate files.
fn scratch_dir(job: &DownloadJob) -> PathBuf {
    job.output_dir
        .join(format!(".{}.{}.parts", job.track.file_stem(), job.index))
}

fn passthrough(debug: bool) -> Stdio {
    if debug { Stdio::inherit() } else { Stdio::null() }
}

fn spawn_error(tool: &str, program: &Path, error: io::Error) -> DownloadError {
    if error.kind() == io::ErrorKind::NotFound {
        DownloadError::tool_not_found(tool)
    } else {
        DownloadError::io(program, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> Track {
        Track::new("1", "Paranoid Android", "Radiohead", "")
    }

    #[test]
    fn test_search_queries_in_priority_order() {
        let queries = search_queries(&track());
        assert_eq!(
            queries,
            [
                "ytsearch1:Paranoid Android Radiohead lyrics".to_string(),
                "ytsearch1:Paranoid Android Radiohead topic".to_string(),
                "ytsearch1:Paranoid Android Radiohead".to_string(),
            ]
        );
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_release_age_current_build() {
        let today = date(2026, 10, 19);
        assert_eq!(release_age("2026.10.02", today), ReleaseAge::Current);
        assert_eq!(release_age("2026.10.02.181253\n", today), ReleaseAge::Current);
        assert_eq!(release_age("2026.11.01", today), ReleaseAge::Current);
    }

    #[test]
    fn test_release_age_one_and_two_months_are_accepted() {
        let today = date(2026, 10, 19);
        assert_eq!(release_age("2026.09.30", today), ReleaseAge::Aging { months: 1 });
        assert_eq!(release_age("2026.08.01", today), ReleaseAge::Aging { months: 2 });
    }

    #[test]
    fn test_release_age_over_two_months_is_stale() {
        let today = date(2026, 10, 19);
        assert_eq!(release_age("2026.07.31", today), ReleaseAge::Stale { months: 3 });
        assert_eq!(release_age("2025.12.01", date(2026, 3, 1)), ReleaseAge::Stale { months: 3 });
        assert_eq!(release_age("2023.3.4", today), ReleaseAge::Stale { months: 43 });
    }

    #[test]
    fn test_release_age_unparsable_versions_are_unknown() {
        let today = date(2026, 10, 19);
        for version in ["", "2026.10", "stable", "1.2.3", "1.2.x", "2026.13.01", "v2026.10.01"] {
            assert_eq!(release_age(version, today), ReleaseAge::Unknown, "{version:?}");
        }
    }

    #[test]
    fn test_mp4_scratch_dir_is_per_job() {
        let first = DownloadJob::new(track(), AudioFormat::Mp4, "/music", 1);
        let second = DownloadJob::new(track(), AudioFormat::Mp4, "/music", 2);
        assert_eq!(
            scratch_dir(&first),
            Path::new("/music/.Radiohead - Paranoid Android.1.parts")
        );
        assert_ne!(scratch_dir(&first), scratch_dir(&second));
    }

    #[test]
    fn test_spawn_error_maps_not_found_to_tool_not_found() {
        let error = spawn_error(
            YT_DLP,
            Path::new("/nope/yt-dlp"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(matches!(error, DownloadError::ToolNotFound { ref tool } if tool == YT_DLP));

        let error = spawn_error(
            YT_DLP,
            Path::new("/nope/yt-dlp"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(error, DownloadError::Io { .. }));
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let downloader = YtDlpDownloader::locate(Some(Path::new("/opt/bin/yt-dlp"))).unwrap();
        assert_eq!(downloader.program(), Path::new("/opt/bin/yt-dlp"));
    }

    #[tokio::test]
    async fn test_mp4_without_ffmpeg_is_tool_not_found() {
        let temp = tempfile::TempDir::new().unwrap();
        let downloader = YtDlpDownloader::new(PathBuf::from("/nope/yt-dlp"), None);
        let job = DownloadJob::new(track(), AudioFormat::Mp4, temp.path(), 1);

        let error = downloader.download(&job).await.unwrap_err();
        assert!(matches!(error, DownloadError::ToolNotFound { ref tool } if tool == "ffmpeg"));
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let temp = tempfile::TempDir::new().unwrap();
        let downloader =
            YtDlpDownloader::new(temp.path().join("does-not-exist"), None);
        let job = DownloadJob::new(track(), AudioFormat::Mp3, temp.path(), 1);

        let error = downloader.download(&job).await.unwrap_err();
        assert!(matches!(error, DownloadError::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn write_script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_mp3_success_returns_expected_path() {
            let temp = TempDir::new().unwrap();
            let script = write_script(temp.path(), "exit 0");
            let out = temp.path().join("out");
            let downloader = YtDlpDownloader::new(script, None);
            let job = DownloadJob::new(track(), AudioFormat::Mp3, &out, 1);

            let path = downloader.download(&job).await.unwrap();
            assert_eq!(path, out.join("Radiohead - Paranoid Android.mp3"));
            assert!(out.is_dir(), "output directory should be created");
        }

        #[tokio::test]
        async fn test_failure_tries_every_query() {
            let temp = TempDir::new().unwrap();
            let log = temp.path().join("calls.log");
            let script = write_script(
                temp.path(),
                &format!("echo \"$1\" >> '{}'\nexit 1", log.display()),
            );
            let downloader = YtDlpDownloader::new(script, None);
            let job = DownloadJob::new(track(), AudioFormat::Mp3, temp.path(), 1);

            let error = downloader.download(&job).await.unwrap_err();
            assert!(matches!(error, DownloadError::ToolFailed { .. }));

            let calls = std::fs::read_to_string(&log).unwrap();
            let queries: Vec<&str> = calls.lines().collect();
            assert_eq!(queries.len(), 3);
            assert!(queries[0].ends_with("lyrics"));
            assert!(queries[1].ends_with("topic"));
        }

        #[tokio::test]
        async fn test_version_reads_stdout() {
            let temp = TempDir::new().unwrap();
            let script = write_script(temp.path(), "echo 2026.09.30");
            let downloader = YtDlpDownloader::new(script, None);

            assert_eq!(downloader.version().await.as_deref(), Some("2026.09.30"));
        }
    }
}
