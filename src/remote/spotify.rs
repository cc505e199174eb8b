//! Spotify Web API search adapter (client-credentials flow).

use serde_json::Value;

use super::http::{json_str, HttpClient};
use super::{CandidateRecord, MetadataProvider, RemoteError, RemoteQuery};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SEARCH_URL: &str = "https://api.spotify.com/v1/search";
const SEARCH_LIMIT: u32 = 10;

/// Application credentials registered with Spotify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

pub struct SpotifyProvider {
    http: HttpClient,
    credentials: SpotifyCredentials,
}

impl SpotifyProvider {
    pub fn new(http: HttpClient, credentials: SpotifyCredentials) -> Self {
        Self { http, credentials }
    }

    fn search_url(query: &RemoteQuery) -> String {
        let (search_type, expression) = match query {
            RemoteQuery::Album { artist, album } => ("album", format!("artist:{artist} album:{album}")),
            RemoteQuery::Track { artist, title } => ("track", format!("artist:{artist} track:{title}")),
        };
        format!(
            "{SEARCH_URL}?q={}&type={search_type}&offset=0&limit={SEARCH_LIMIT}",
            urlencoding::encode(&expression)
        )
    }
}

fn first_artist_name(value: &Value) -> Option<String> {
    value
        .get("artists")
        .and_then(Value::as_array)
        .and_then(|artists| artists.first())
        .and_then(|artist| json_str(artist, "name"))
}

fn first_image_url(value: &Value) -> Option<String> {
    value
        .get("images")
        .and_then(Value::as_array)
        .and_then(|images| images.iter().find_map(|image| json_str(image, "url")))
}

fn album_candidate(album: &Value) -> CandidateRecord {
    CandidateRecord {
        artist: first_artist_name(album),
        album: json_str(album, "name"),
        title: None,
        record_type: json_str(album, "album_type"),
        release_date: json_str(album, "release_date"),
        image_url: first_image_url(album),
    }
}

fn track_candidate(track: &Value) -> CandidateRecord {
    let album = track.get("album").unwrap_or(&Value::Null);
    CandidateRecord {
        artist: first_artist_name(track).or_else(|| first_artist_name(album)),
        title: json_str(track, "name"),
        ..album_candidate(album)
    }
}

/// Maps a `/v1/search` response body onto candidates, keeping Spotify's ranking.
pub fn parse_search_response(query: &RemoteQuery, body: &Value) -> Vec<CandidateRecord> {
    let (section, to_candidate): (&str, fn(&Value) -> CandidateRecord) = match query {
        RemoteQuery::Album { .. } => ("albums", album_candidate),
        RemoteQuery::Track { .. } => ("tracks", track_candidate),
    };
    body.get(section)
        .and_then(|section| section.get("items"))
        .and_then(Value::as_array)
        .map(|items| items.iter().map(to_candidate).collect())
        .unwrap_or_default()
}

impl MetadataProvider for SpotifyProvider {
    fn name(&self) -> &'static str {
        "Spotify"
    }

    fn requires_token(&self) -> bool {
        true
    }

    fn fetch_token(&self) -> Result<String, RemoteError> {
        if self.credentials.client_id.trim().is_empty() {
            return Err(RemoteError::MissingCredentials("spotify client id"));
        }
        if self.credentials.client_secret.trim().is_empty() {
            return Err(RemoteError::MissingCredentials("spotify client secret"));
        }

        let body = self
            .http
            .post_form_json(
                TOKEN_URL,
                &[
                    ("grant_type", "client_credentials"),
                    ("client_id", self.credentials.client_id.trim()),
                    ("client_secret", self.credentials.client_secret.trim()),
                ],
            )
            .map_err(|error| match error {
                // invalid_client is reported as 400 by the accounts service.
                RemoteError::Status(400) => RemoteError::Unauthorized,
                other => other,
            })?;
        json_str(&body, "access_token")
            .ok_or_else(|| RemoteError::Malformed("token response has no access_token".to_string()))
    }

    fn search(
        &self,
        query: &RemoteQuery,
        access_token: Option<&str>,
    ) -> Result<Vec<CandidateRecord>, RemoteError> {
        let token = access_token.ok_or(RemoteError::Unauthorized)?;
        let authorization = format!("Bearer {token}");
        let body = self.http.get_json(
            &Self::search_url(query),
            &[("Authorization", authorization.as_str())],
        )?;
        Ok(parse_search_response(query, &body))
    }
}
