//! Assembly of the raw track-list text from a file argument and/or stdin.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Raw input gathered for one run.
#[derive(Debug, Default)]
pub(crate) struct RawInput {
    pub(crate) text: Option<String>,
    pub(crate) piped_stdin_was_empty: bool,
}

/// Reads the track list from `path`, or from stdin when `path` is `-` or
/// omitted and stdin is piped. A terminal stdin is never read.
pub(crate) fn process_input(path: Option<&Path>) -> Result<RawInput> {
    match path {
        Some(path) if path != Path::new("-") => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read track list '{}'", path.display()))?;
            Ok(RawInput {
                text: Some(text),
                piped_stdin_was_empty: false,
            })
        }
        _ if io::stdin().is_terminal() => Ok(RawInput::default()),
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read track list from stdin")?;
            Ok(classify_stdin(buffer))
        }
    }
}

fn classify_stdin(buffer: String) -> RawInput {
    if buffer.trim().is_empty() {
        RawInput {
            text: None,
            piped_stdin_was_empty: true,
        }
    } else {
        RawInput {
            text: Some(buffer),
            piped_stdin_was_empty: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_process_input_reads_file_argument() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tracks.json");
        fs::write(&path, "[]").unwrap();

        let input = process_input(Some(&path)).unwrap();
        assert_eq!(input.text.as_deref(), Some("[]"));
        assert!(!input.piped_stdin_was_empty);
    }

    #[test]
    fn test_process_input_missing_file_names_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.json");

        let err = process_input(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_classify_stdin_blank_is_empty() {
        let input = classify_stdin("  \n\t".to_string());
        assert!(input.text.is_none());
        assert!(input.piped_stdin_was_empty);
    }

    #[test]
    fn test_classify_stdin_keeps_content() {
        let input = classify_stdin("[{\"id\":\"1\"}]".to_string());
        assert!(input.text.is_some());
        assert!(!input.piped_stdin_was_empty);
    }
}
