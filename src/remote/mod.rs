//! Remote metadata lookup: provider abstraction, candidate selection and token handling.

pub(crate) mod deezer;
pub(crate) mod http;
pub(crate) mod spotify;

use log::{debug, info, warn};
use thiserror::Error;

/// Name fragments that demote a candidate below proper studio albums.
pub const REJECTED_ALBUM_SUBSTRINGS: [&str; 18] = [
    "best of",
    "greatest hits",
    "hits",
    "collection",
    "b-sides",
    "classics",
    "live",
    "tribute",
    "singles",
    "essential",
    "anniversary",
    "karaoke",
    "deluxe",
    "remaster",
    "special edition",
    "expanded edition",
    "box set",
    "boxset",
];

/// One raw row from a provider search response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateRecord {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub record_type: Option<String>,
    pub release_date: Option<String>,
    pub image_url: Option<String>,
}

/// A candidate carrying every field the resolver needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCandidate {
    pub artist: String,
    pub album: String,
    pub record_type: String,
    pub release_date: String,
    pub image_url: String,
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl CandidateRecord {
    /// Returns the candidate's required fields, or `None` if any is missing.
    pub fn validate(&self) -> Option<ValidCandidate> {
        Some(ValidCandidate {
            artist: required(&self.artist)?,
            album: required(&self.album)?,
            record_type: required(&self.record_type)?,
            release_date: required(&self.release_date)?,
            image_url: required(&self.image_url)?,
        })
    }
}

impl ValidCandidate {
    pub fn is_album(&self) -> bool {
        self.record_type.eq_ignore_ascii_case("album")
    }

    pub fn has_rejected_name(&self) -> bool {
        let lowered = self.album.to_lowercase();
        REJECTED_ALBUM_SUBSTRINGS
            .iter()
            .any(|substring| lowered.contains(substring))
    }
}

/// Picks the record to trust from a relevance-ordered candidate list.
///
/// The first structurally valid studio album whose name avoids the rejection list
/// wins; failing that, the first structurally valid candidate of any kind.
pub fn select_best(candidates: &[CandidateRecord]) -> Option<ValidCandidate> {
    let valid: Vec<ValidCandidate> = candidates
        .iter()
        .filter_map(CandidateRecord::validate)
        .collect();

    if let Some(preferred) = valid
        .iter()
        .find(|candidate| candidate.is_album() && !candidate.has_rejected_name())
    {
        return Some(preferred.clone());
    }

    let fallback = valid.into_iter().next();
    if let Some(candidate) = fallback.as_ref() {
        debug!(
            "No clean album candidate, falling back to first valid record '{}' ({})",
            candidate.album, candidate.record_type
        );
    }
    fallback
}

/// What to search for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteQuery {
    Album { artist: String, album: String },
    Track { artist: String, title: String },
}

impl RemoteQuery {
    pub fn artist(&self) -> &str {
        match self {
            Self::Album { artist, .. } | Self::Track { artist, .. } => artist,
        }
    }

    pub fn with_artist(&self, artist: String) -> Self {
        match self {
            Self::Album { album, .. } => Self::Album {
                artist,
                album: album.clone(),
            },
            Self::Track { title, .. } => Self::Track {
                artist,
                title: title.clone(),
            },
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Album { artist, album } => format!("album '{album}' by '{artist}'"),
            Self::Track { artist, title } => format!("track '{title}' by '{artist}'"),
        }
    }
}

/// Provider failures. Only [`RemoteError::Unauthorized`] changes control flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("provider rejected the access credentials")]
    Unauthorized,
    #[error("provider rate limit reached")]
    RateLimited,
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
}

/// An external search API that yields [`CandidateRecord`]s.
pub trait MetadataProvider {
    fn name(&self) -> &'static str;

    fn requires_token(&self) -> bool {
        false
    }

    /// Obtains a fresh access token.
    fn fetch_token(&self) -> Result<String, RemoteError> {
        Err(RemoteError::MissingCredentials("provider does not issue tokens"))
    }

    fn search(
        &self,
        query: &RemoteQuery,
        access_token: Option<&str>,
    ) -> Result<Vec<CandidateRecord>, RemoteError>;
}

/// Mutable remote state carried across resolutions within one process run.
#[derive(Debug, Clone, Default)]
pub struct RemoteContext {
    pub access_token: Option<String>,
    /// Set once credentials are rejected twice in a row; no further calls are made.
    pub disabled: bool,
}

/// Runs queries against one provider with token refresh and artist-name retry.
pub struct RemoteLookup {
    provider: Box<dyn MetadataProvider>,
}

impl RemoteLookup {
    pub fn new(provider: Box<dyn MetadataProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Looks up `query` and selects a candidate.
    ///
    /// Artists stored with "_" in place of "/" (e.g. "AC_DC") get one retry with the
    /// slash restored when the first query selects nothing.
    pub fn lookup(&self, context: &mut RemoteContext, query: &RemoteQuery) -> Option<ValidCandidate> {
        if let Some(found) = self.lookup_once(context, query) {
            return Some(found);
        }

        let artist = query.artist();
        if !artist.contains('_') || context.disabled {
            return None;
        }
        let retry = query.with_artist(artist.replace('_', "/"));
        info!(
            "{}: retrying lookup as {}",
            self.provider.name(),
            retry.describe()
        );
        self.lookup_once(context, &retry)
    }

    fn lookup_once(&self, context: &mut RemoteContext, query: &RemoteQuery) -> Option<ValidCandidate> {
        let candidates = self.search_authorized(context, query)?;
        debug!(
            "{}: {} candidate(s) for {}",
            self.provider.name(),
            candidates.len(),
            query.describe()
        );
        select_best(&candidates)
    }

    fn search_authorized(
        &self,
        context: &mut RemoteContext,
        query: &RemoteQuery,
    ) -> Option<Vec<CandidateRecord>> {
        if context.disabled {
            return None;
        }
        if self.provider.requires_token() && context.access_token.is_none() && !self.refresh_token(context)
        {
            return None;
        }

        match self.provider.search(query, context.access_token.as_deref()) {
            Ok(candidates) => Some(candidates),
            Err(RemoteError::Unauthorized) => {
                info!(
                    "{}: access token rejected, refreshing once",
                    self.provider.name()
                );
                if !self.refresh_token(context) {
                    return None;
                }
                match self.provider.search(query, context.access_token.as_deref()) {
                    Ok(candidates) => Some(candidates),
                    Err(RemoteError::Unauthorized) => {
                        warn!(
                            "{}: credentials rejected after refresh, disabling remote lookups",
                            self.provider.name()
                        );
                        context.disabled = true;
                        context.access_token = None;
                        None
                    }
                    Err(error) => {
                        warn!("{}: search failed after refresh: {}", self.provider.name(), error);
                        None
                    }
                }
            }
            Err(error) => {
                warn!("{}: search for {} failed: {}", self.provider.name(), query.describe(), error);
                None
            }
        }
    }

    fn refresh_token(&self, context: &mut RemoteContext) -> bool {
        match self.provider.fetch_token() {
            Ok(token) => {
                debug!("{}: obtained access token", self.provider.name());
                context.access_token = Some(token);
                true
            }
            Err(error @ (RemoteError::Unauthorized | RemoteError::MissingCredentials(_))) => {
                warn!(
                    "{}: cannot obtain access token ({}), disabling remote lookups",
                    self.provider.name(),
                    error
                );
                context.disabled = true;
                context.access_token = None;
                false
            }
            Err(error) => {
                warn!("{}: token request failed: {}", self.provider.name(), error);
                false
            }
        }
    }
}
