//! Resolved "now playing" record and the per-source field set it is built from.

use std::path::PathBuf;

use serde::Serialize;

/// Cover artwork attached to a resolved track. Decoding is left to the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artwork {
    /// Raw picture bytes embedded in the track's tags.
    Embedded {
        #[serde(rename = "bytes", serialize_with = "serialize_byte_count")]
        data: Vec<u8>,
    },
    /// Conventionally named image file next to (or above) the track.
    LocalFile { path: PathBuf },
    /// Cover URL taken from the selected remote candidate.
    RemoteUrl { url: String },
}

fn serialize_byte_count<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(data.len() as u64)
}

/// Release year after date normalization.
///
/// Dates that do not reduce to a year are kept verbatim rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReleaseYear {
    Year(u16),
    Unparsed(String),
}

impl std::fmt::Display for ReleaseYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{year}"),
            Self::Unparsed(text) => f.write_str(text),
        }
    }
}

/// Partially filled fields produced by one source stage.
///
/// `date` holds the raw date text; it becomes a [`ReleaseYear`] during normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFields {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub date: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl SourceFields {
    /// Builds a field set, dropping values that are empty after trimming.
    pub fn from_values(
        title: Option<String>,
        artist: Option<String>,
        album: Option<String>,
        date: Option<String>,
    ) -> Self {
        Self {
            title: non_empty(title),
            artist: non_empty(artist),
            album: non_empty(album),
            date: non_empty(date),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.album.is_none() && self.date.is_none()
    }

    /// True when any of title, artist or album is still unknown.
    pub fn missing_identity(&self) -> bool {
        self.title.is_none() || self.artist.is_none() || self.album.is_none()
    }
}

/// Canonical, displayable description of the current track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackRecord {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<ReleaseYear>,
    pub artwork: Option<Artwork>,
}
