//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use songdl_core::AudioFormat;

/// Download albums, playlists and track lists through yt-dlp.
///
/// Songdl reads a JSON track list (a bare array of tracks or an album/playlist
/// object with a `tracks` array) and downloads every track in parallel with
/// automatic retry on failures.
#[derive(Parser, Debug, Clone)]
#[command(name = "songdl")]
#[command(author, version, about)]
pub struct Args {
    /// JSON track list to download ("-" or omitted reads stdin)
    #[arg(value_name = "TRACKS")]
    pub tracks: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Download format: mp3 or mp4 [default: mp3]
    #[arg(short, long)]
    pub format: Option<AudioFormat>,

    /// Output directory for downloaded files [default: downloads]
    #[arg(short = 'o', long = "out", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Number of parallel downloads (1-10) [default: 3]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub concurrency: Option<u8>,

    /// Maximum retries per track after the first attempt (0-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Backoff unit between retries in milliseconds; retry n waits n units (0-60000) [default: 1000]
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub retry_delay_ms: Option<u64>,

    /// Cancel the batch after this many seconds (0 disables, max 86400) [default: 300]
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=86400))]
    pub timeout_secs: Option<u64>,

    /// Save a `<name>_metadata.json` manifest next to the downloads
    #[arg(long)]
    pub metadata: bool,

    /// Show yt-dlp output and enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Path to the yt-dlp executable [default: looked up on PATH]
    #[arg(long = "yt-dlp", value_name = "PATH")]
    pub yt_dlp: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["songdl"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.tracks.is_none());
        assert!(args.format.is_none());
        assert!(args.concurrency.is_none());
        assert!(!args.metadata);
        assert!(!args.debug);
    }

    #[test]
    fn test_cli_tracks_positional() {
        let args = Args::try_parse_from(["songdl", "album.json"]).unwrap();
        assert_eq!(args.tracks, Some(PathBuf::from("album.json")));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["songdl", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_format_parses_case_insensitively() {
        let args = Args::try_parse_from(["songdl", "--format", "MP4"]).unwrap();
        assert_eq!(args.format, Some(AudioFormat::Mp4));

        let args = Args::try_parse_from(["songdl", "-f", "mp3"]).unwrap();
        assert_eq!(args.format, Some(AudioFormat::Mp3));
    }

    #[test]
    fn test_cli_format_rejects_unknown() {
        let result = Args::try_parse_from(["songdl", "--format", "flac"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_out_flag() {
        let args = Args::try_parse_from(["songdl", "-o", "music"]).unwrap();
        assert_eq!(args.output_dir, Some(PathBuf::from("music")));

        let args = Args::try_parse_from(["songdl", "--out", "/tmp/x"]).unwrap();
        assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn test_cli_concurrency_range() {
        let args = Args::try_parse_from(["songdl", "-c", "10"]).unwrap();
        assert_eq!(args.concurrency, Some(10));

        for invalid in ["0", "11"] {
            let err = Args::try_parse_from(["songdl", "-c", invalid]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_max_retries_range() {
        let args = Args::try_parse_from(["songdl", "-r", "0"]).unwrap();
        assert_eq!(args.max_retries, Some(0));

        let err = Args::try_parse_from(["songdl", "--max-retries", "11"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_retry_delay_and_timeout() {
        let args = Args::try_parse_from([
            "songdl",
            "--retry-delay-ms",
            "250",
            "--timeout-secs",
            "0",
        ])
        .unwrap();
        assert_eq!(args.retry_delay_ms, Some(250));
        assert_eq!(args.timeout_secs, Some(0));

        let err = Args::try_parse_from(["songdl", "--retry-delay-ms", "60001"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_flags() {
        let args = Args::try_parse_from([
            "songdl",
            "--metadata",
            "--debug",
            "--yt-dlp",
            "/opt/bin/yt-dlp",
            "-q",
        ])
        .unwrap();
        assert!(args.metadata);
        assert!(args.debug);
        assert!(args.quiet);
        assert_eq!(args.yt_dlp, Some(PathBuf::from("/opt/bin/yt-dlp")));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["songdl", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["songdl", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
