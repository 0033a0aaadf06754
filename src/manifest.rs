//! `<name>_metadata.json` manifest written next to a batch's downloads.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use songdl_core::{DownloadResult, sanitize_file_name};

use crate::tracklist::{Collection, CollectionKind};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Manifest {
    #[serde(rename = "type")]
    kind: CollectionKind,
    id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    curator: Option<String>,
    track_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    artwork_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_url: Option<String>,
    downloaded_at: DateTime<Utc>,
    tracks: Vec<ManifestTrack>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ManifestTrack {
    index: usize,
    id: String,
    name: String,
    artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_path: Option<String>,
    downloaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    downloaded_at: Option<DateTime<Utc>>,
    retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Manifest {
    pub(crate) fn from_collection(collection: &Collection) -> Self {
        let tracks = collection
            .tracks
            .iter()
            .enumerate()
            .map(|(i, track)| ManifestTrack {
                index: i + 1,
                id: track.id.clone(),
                name: track.name.clone(),
                artist: track.artist_name.clone(),
                file_path: None,
                downloaded: false,
                downloaded_at: None,
                retries: 0,
                error: None,
            })
            .collect();
        Self {
            kind: collection.kind,
            id: collection.id.clone(),
            name: collection.name.clone(),
            artist: collection.artist.clone(),
            curator: collection.curator.clone(),
            track_count: collection.tracks.len(),
            artwork_url: collection.artwork_url.clone(),
            source_url: collection.source_url.clone(),
            downloaded_at: Utc::now(),
            tracks,
        }
    }

    /// Records the outcome of one job. Jobs are matched by their 1-based index.
    pub(crate) fn record(&mut self, result: &DownloadResult) {
        let Some(entry) = self
            .tracks
            .iter_mut()
            .find(|entry| entry.index == result.job.index)
        else {
            return;
        };
        entry.retries = result.retries;
        match &result.outcome {
            Ok(path) => {
                entry.downloaded = true;
                entry.downloaded_at = Some(Utc::now());
                entry.file_path = Some(path.display().to_string());
                entry.error = None;
            }
            Err(error) => {
                entry.downloaded = false;
                entry.error = Some(error.to_string());
            }
        }
    }

    pub(crate) fn file_name(&self) -> String {
        format!("{}_metadata.json", sanitize_file_name(&self.name))
    }

    /// Writes the manifest into `output_dir` and returns its path.
    pub(crate) fn save(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(self.file_name());
        let data = serde_json::to_vec_pretty(self).context("Failed to serialize metadata")?;
        fs::write(&path, data)
            .with_context(|| format!("Failed to write metadata file '{}'", path.display()))?;
        Ok(path)
    }

    #[cfg(test)]
    fn track(&self, index: usize) -> Option<&ManifestTrack> {
        self.tracks.iter().find(|entry| entry.index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracklist::parse_track_list;
    use songdl_core::{
        AudioFormat, DownloadError, DownloadExhaustedError, DownloadJob, Track,
    };
    use std::time::Duration;
    use tempfile::TempDir;

    fn collection() -> Collection {
        parse_track_list(
            r#"{
                "kind": "playlist",
                "id": "pl.1",
                "name": "Road/Trip",
                "curator": "Me",
                "tracks": [
                    {"id": "a", "name": "One", "artistName": "X"},
                    {"id": "b", "name": "Two", "artistName": "Y"}
                ]
            }"#,
        )
        .unwrap()
    }

    fn result(index: usize, outcome: Result<PathBuf, DownloadExhaustedError>) -> DownloadResult {
        DownloadResult {
            job: DownloadJob::new(Track::new("a", "One", "X", ""), AudioFormat::Mp3, "/out", index),
            outcome,
            retries: 1,
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_manifest_starts_with_nothing_downloaded() {
        let manifest = Manifest::from_collection(&collection());
        assert_eq!(manifest.track_count, 2);
        assert_eq!(manifest.track(2).map(|t| t.id.as_str()), Some("b"));
        assert!(manifest.tracks.iter().all(|t| !t.downloaded));
    }

    #[test]
    fn test_manifest_records_success_and_failure() {
        let mut manifest = Manifest::from_collection(&collection());
        manifest.record(&result(1, Ok(PathBuf::from("/out/X - One.mp3"))));
        manifest.record(&result(
            2,
            Err(DownloadExhaustedError {
                attempts: 4,
                source: DownloadError::other("no match"),
            }),
        ));

        let first = manifest.track(1).unwrap();
        assert!(first.downloaded);
        assert_eq!(first.file_path.as_deref(), Some("/out/X - One.mp3"));
        assert!(first.downloaded_at.is_some());
        assert_eq!(first.retries, 1);

        let second = manifest.track(2).unwrap();
        assert!(!second.downloaded);
        assert!(second.error.as_deref().unwrap().contains("after 4 attempts"));
    }

    #[test]
    fn test_manifest_ignores_unknown_index() {
        let mut manifest = Manifest::from_collection(&collection());
        let before = manifest.tracks.clone();
        manifest.record(&result(9, Ok(PathBuf::from("/out/x.mp3"))));
        assert_eq!(manifest.tracks, before);
    }

    #[test]
    fn test_manifest_save_uses_sanitized_name() {
        let temp = TempDir::new().unwrap();
        let manifest = Manifest::from_collection(&collection());
        let path = manifest.save(temp.path()).unwrap();

        assert_eq!(path, temp.path().join("Road_Trip_metadata.json"));
        let saved: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved["type"], "playlist");
        assert_eq!(saved["curator"], "Me");
        assert_eq!(saved["track_count"], 2);
        assert!(saved.get("artist").is_none());
        assert_eq!(saved["tracks"][0]["downloaded"], false);
    }

    #[test]
    fn test_manifest_timestamps_are_rfc3339() {
        let temp = TempDir::new().unwrap();
        let before = Utc::now();
        let mut manifest = Manifest::from_collection(&collection());
        manifest.record(&result(1, Ok(PathBuf::from("/out/X - One.mp3"))));
        let path = manifest.save(temp.path()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let batch_time = saved["downloaded_at"].as_str().expect("string timestamp");
        let batch_time = DateTime::parse_from_rfc3339(batch_time).unwrap();
        assert!(batch_time >= before);

        let track_time = saved["tracks"][0]["downloaded_at"]
            .as_str()
            .expect("string timestamp");
        assert!(DateTime::parse_from_rfc3339(track_time).unwrap() >= batch_time);
        assert!(saved["tracks"][1].get("downloaded_at").is_none());
    }
}
