//! Deezer public search adapter.
//!
//! Search rows carry no release date, so the leading albums are hydrated from
//! the album endpoint before selection.

use std::collections::HashMap;

use log::debug;
use serde_json::Value;

use super::http::{json_str, HttpClient};
use super::{CandidateRecord, MetadataProvider, RemoteError, RemoteQuery};

const API_BASE_URL: &str = "https://api.deezer.com";
const MAX_ALBUM_DETAIL_LOOKUPS: usize = 5;
const QUOTA_EXCEEDED_CODE: i64 = 4;

pub struct DeezerProvider {
    http: HttpClient,
}

/// Search row plus the album id used for hydration.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeezerRow {
    album_id: Option<String>,
    candidate: CandidateRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AlbumDetail {
    record_type: Option<String>,
    release_date: Option<String>,
}

impl DeezerProvider {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn search_url(query: &RemoteQuery) -> String {
        let (endpoint, expression) = match query {
            RemoteQuery::Album { artist, album } => {
                ("search/album", format!("artist:\"{artist}\" album:\"{album}\""))
            }
            RemoteQuery::Track { artist, title } => {
                ("search/track", format!("artist:\"{artist}\" track:\"{title}\""))
            }
        };
        format!(
            "{API_BASE_URL}/{endpoint}?q={}",
            urlencoding::encode(&expression)
        )
    }

    fn fetch_album_detail(&self, album_id: &str) -> Result<AlbumDetail, RemoteError> {
        let url = format!("{API_BASE_URL}/album/{}", urlencoding::encode(album_id));
        let body = self.http.get_json(&url, &[])?;
        check_error_payload(&body)?;
        Ok(AlbumDetail {
            record_type: json_str(&body, "record_type"),
            release_date: json_str(&body, "release_date"),
        })
    }

    fn hydrate(&self, rows: Vec<DeezerRow>) -> Vec<CandidateRecord> {
        let mut details: HashMap<String, AlbumDetail> = HashMap::new();
        for album_id in rows.iter().filter_map(|row| row.album_id.as_ref()) {
            if details.len() >= MAX_ALBUM_DETAIL_LOOKUPS {
                break;
            }
            if details.contains_key(album_id) {
                continue;
            }
            match self.fetch_album_detail(album_id) {
                Ok(detail) => {
                    details.insert(album_id.clone(), detail);
                }
                Err(RemoteError::RateLimited) => {
                    debug!("Deezer: album detail hydration stopped by rate limit");
                    break;
                }
                Err(error) => {
                    debug!("Deezer: album {album_id} detail unavailable: {error}");
                    details.insert(album_id.clone(), AlbumDetail::default());
                }
            }
        }
        apply_album_details(rows, &details)
    }
}

fn apply_album_details(rows: Vec<DeezerRow>, details: &HashMap<String, AlbumDetail>) -> Vec<CandidateRecord> {
    rows.into_iter()
        .map(|row| {
            let mut candidate = row.candidate;
            if let Some(detail) = row.album_id.as_ref().and_then(|id| details.get(id)) {
                if detail.record_type.is_some() {
                    candidate.record_type = detail.record_type.clone();
                }
                if detail.release_date.is_some() {
                    candidate.release_date = detail.release_date.clone();
                }
            }
            candidate
        })
        .collect()
}

fn check_error_payload(body: &Value) -> Result<(), RemoteError> {
    let Some(error) = body.get("error") else {
        return Ok(());
    };
    if error.get("code").and_then(Value::as_i64) == Some(QUOTA_EXCEEDED_CODE) {
        return Err(RemoteError::RateLimited);
    }
    let message = json_str(error, "message").unwrap_or_else(|| error.to_string());
    Err(RemoteError::Malformed(format!("Deezer error: {message}")))
}

fn id_string(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}

fn cover_url(album: &Value) -> Option<String> {
    json_str(album, "cover_big")
        .or_else(|| json_str(album, "cover_medium"))
        .or_else(|| json_str(album, "cover"))
}

fn artist_name(value: &Value) -> Option<String> {
    value.get("artist").and_then(|artist| json_str(artist, "name"))
}

fn album_row(album: &Value) -> DeezerRow {
    DeezerRow {
        album_id: id_string(album),
        candidate: CandidateRecord {
            artist: artist_name(album),
            album: json_str(album, "title"),
            title: None,
            record_type: json_str(album, "record_type"),
            release_date: json_str(album, "release_date"),
            image_url: cover_url(album),
        },
    }
}

fn track_row(track: &Value) -> DeezerRow {
    let album = track.get("album").unwrap_or(&Value::Null);
    DeezerRow {
        album_id: id_string(album),
        candidate: CandidateRecord {
            artist: artist_name(track).or_else(|| artist_name(album)),
            album: json_str(album, "title"),
            title: json_str(track, "title"),
            // `album.type` on track rows is the object kind, not the release type.
            record_type: json_str(album, "record_type"),
            release_date: json_str(album, "release_date"),
            image_url: cover_url(album),
        },
    }
}

fn parse_search_rows(query: &RemoteQuery, body: &Value) -> Vec<DeezerRow> {
    let to_row: fn(&Value) -> DeezerRow = match query {
        RemoteQuery::Album { .. } => album_row,
        RemoteQuery::Track { .. } => track_row,
    };
    body.get("data")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().map(to_row).collect())
        .unwrap_or_default()
}

impl MetadataProvider for DeezerProvider {
    fn name(&self) -> &'static str {
        "Deezer"
    }

    fn search(
        &self,
        query: &RemoteQuery,
        _access_token: Option<&str>,
    ) -> Result<Vec<CandidateRecord>, RemoteError> {
        let body = self.http.get_json(&Self::search_url(query), &[])?;
        check_error_payload(&body)?;
        Ok(self.hydrate(parse_search_rows(query, &body)))
    }
}
