//! Track list input: a bare JSON array of tracks or an album/playlist object.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use songdl_core::Track;

/// What kind of collection a track list came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CollectionKind {
    Album,
    Playlist,
    #[default]
    Tracks,
}

/// A named group of tracks downloaded as one batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Collection {
    #[serde(default)]
    pub(crate) kind: CollectionKind,
    #[serde(default)]
    pub(crate) id: String,
    #[serde(default = "default_collection_name")]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) artist: Option<String>,
    #[serde(default)]
    pub(crate) curator: Option<String>,
    #[serde(default)]
    pub(crate) artwork_url: Option<String>,
    #[serde(default)]
    pub(crate) source_url: Option<String>,
    pub(crate) tracks: Vec<Track>,
}

fn default_collection_name() -> String {
    "tracks".to_string()
}

impl Collection {
    fn from_tracks(tracks: Vec<Track>) -> Self {
        Self {
            kind: CollectionKind::Tracks,
            id: String::new(),
            name: default_collection_name(),
            artist: None,
            curator: None,
            artwork_url: None,
            source_url: None,
            tracks,
        }
    }

    /// Drops every track whose id already appeared earlier in the list and
    /// returns the dropped tracks in input order.
    pub(crate) fn remove_duplicate_tracks(&mut self) -> Vec<Track> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        self.tracks.retain(|track| {
            if seen.insert(track.id.clone()) {
                true
            } else {
                duplicates.push(track.clone());
                false
            }
        });
        duplicates
    }

    /// One-line description printed before the batch starts.
    pub(crate) fn headline(&self) -> String {
        let count = self.tracks.len();
        match (self.kind, &self.artist, &self.curator) {
            (CollectionKind::Album, Some(artist), _) => {
                format!("Album: {} - {artist} ({count} tracks)", self.name)
            }
            (CollectionKind::Playlist, _, Some(curator)) => {
                format!("Playlist: {} by {curator} ({count} tracks)", self.name)
            }
            (CollectionKind::Album, ..) => format!("Album: {} ({count} tracks)", self.name),
            (CollectionKind::Playlist, ..) => format!("Playlist: {} ({count} tracks)", self.name),
            (CollectionKind::Tracks, ..) => format!("Track list ({count} tracks)"),
        }
    }
}

/// Parses a track list document.
pub(crate) fn parse_track_list(raw: &str) -> Result<Collection> {
    let document: Value = serde_json::from_str(raw).context("Track list is not valid JSON")?;
    let collection = match document {
        Value::Array(_) => {
            let tracks: Vec<Track> =
                serde_json::from_value(document).context("Invalid track in track list")?;
            Collection::from_tracks(tracks)
        }
        Value::Object(_) => {
            serde_json::from_value(document).context("Invalid album/playlist object")?
        }
        _ => bail!("Track list must be a JSON array of tracks or an album/playlist object"),
    };
    Ok(collection)
}
