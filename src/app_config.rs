//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use songdl_core::AudioFormat;

/// Key/value file configuration for songdl defaults.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// Default output directory for downloads.
    pub output_dir: Option<PathBuf>,
    /// Default download format.
    pub format: Option<AudioFormat>,
    /// Default number of parallel downloads (same range as CLI).
    pub concurrency: Option<u8>,
    /// Default retries per track after the first attempt.
    pub max_retries: Option<u8>,
    /// Default backoff unit in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Default whole-batch deadline in seconds (0 disables).
    pub timeout_secs: Option<u64>,
    /// Explicit yt-dlp executable.
    pub yt_dlp_path: Option<PathBuf>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=10).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=10");
        }
        if let Some(max_retries) = self.max_retries
            && max_retries > 10
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 0..=10");
        }
        if let Some(retry_delay_ms) = self.retry_delay_ms
            && retry_delay_ms > 60_000
        {
            bail!(
                "Invalid config value for `retry_delay_ms`: {retry_delay_ms}. Expected range: 0..=60000"
            );
        }
        if let Some(timeout_secs) = self.timeout_secs
            && timeout_secs > 86_400
        {
            bail!(
                "Invalid config value for `timeout_secs`: {timeout_secs}. Expected range: 0..=86400"
            );
        }
        Ok(())
    }
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/songdl/config.toml`
/// 2. `$HOME/.config/songdl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("songdl").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("songdl")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "output_dir" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.output_dir = Some(PathBuf::from(parsed));
            }
            "format" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.format = Some(parsed.parse::<AudioFormat>().with_context(invalid)?);
            }
            "concurrency" => {
                cfg.concurrency = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "max_retries" => {
                cfg.max_retries = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "retry_delay_ms" => {
                cfg.retry_delay_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "timeout_secs" => {
                cfg.timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "yt_dlp_path" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.yt_dlp_path = Some(PathBuf::from(parsed));
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_number}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
