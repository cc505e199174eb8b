//! Persistent configuration model, defaults and file loading.

use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::local_artwork::DEFAULT_MAX_ASCENT;

const CONFIG_DIR_NAME: &str = "nowplaying";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Local library layout.
    pub library: LibraryConfig,
    #[serde(default)]
    /// Remote metadata provider settings.
    pub remote: RemoteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local library layout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LibraryConfig {
    /// Root of the music library. Empty means "ask the MPD config".
    #[serde(default)]
    pub music_directory: String,
    /// How many parent folders the artwork search may climb.
    #[serde(default = "default_artwork_search_depth")]
    pub artwork_search_depth: usize,
}

/// Which remote service fills metadata gaps.
#[derive(
    Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RemoteProviderKind {
    #[default]
    Spotify,
    Deezer,
    #[serde(rename = "none", alias = "disabled")]
    #[value(name = "none")]
    Disabled,
}

/// Remote metadata provider settings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub provider: RemoteProviderKind,
    #[serde(default)]
    pub spotify_client_id: String,
    /// Empty means the secret is read from the system keyring.
    #[serde(default)]
    pub spotify_client_secret: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    /// `RUST_LOG`-style directives, e.g. `info` or `warn,nowplaying::remote=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory is available on this system")]
    NoConfigDir,
    #[error("failed to access config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_directory: String::new(),
            artwork_search_depth: default_artwork_search_depth(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            provider: RemoteProviderKind::default(),
            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            min_request_interval_ms: default_min_request_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_artwork_search_depth() -> usize {
    DEFAULT_MAX_ASCENT
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_min_request_interval_ms() -> u64 {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Filter directives for the log backend; blank means `info`.
    pub fn filter_directives(&self) -> &str {
        match self.level.trim() {
            "" => "info",
            directives => directives,
        }
    }
}

impl Config {
    /// Configured music root, falling back to the MPD `music_directory` setting.
    pub fn music_directory(&self) -> Option<PathBuf> {
        let configured = self.library.music_directory.trim();
        if !configured.is_empty() {
            return Some(expand_home(configured, dirs::home_dir().as_deref()));
        }
        mpd_music_directory()
    }
}

/// Clamps numeric settings into their supported ranges.
pub fn sanitize_config(config: Config) -> Config {
    let clamped_depth = config.library.artwork_search_depth.clamp(1, 8);
    let clamped_timeout = config.remote.request_timeout_ms.clamp(500, 30_000);
    let clamped_interval = config.remote.min_request_interval_ms.min(10_000);

    Config {
        library: LibraryConfig {
            artwork_search_depth: clamped_depth,
            ..config.library
        },
        remote: RemoteConfig {
            request_timeout_ms: clamped_timeout,
            min_request_interval_ms: clamped_interval,
            ..config.remote
        },
        logging: config.logging,
    }
}

/// `<config dir>/nowplaying/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|root| root.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

/// Loads `path`, writing a default config there first when it does not exist.
///
/// Runs before the logger is installed, so it reports through its result only.
pub fn load_or_create_config(path: &Path) -> Result<Config, ConfigError> {
    let io_error = |source: std::io::Error| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let default_config = sanitize_config(Config::default());
        std::fs::write(path, toml::to_string(&default_config)?).map_err(io_error)?;
        return Ok(default_config);
    }

    let content = std::fs::read_to_string(path).map_err(io_error)?;
    let parsed = toml::from_str::<Config>(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(sanitize_config(parsed))
}

/// Expands a leading `~` against `home`.
pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home.to_path_buf(),
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

/// Extracts the `music_directory` value from MPD config text.
fn parse_mpd_music_directory(conf_text: &str, home: Option<&Path>) -> Option<PathBuf> {
    conf_text.lines().find_map(|line| {
        let line = line.trim();
        if line.starts_with('#') {
            return None;
        }
        let (key, value) = line.split_once(char::is_whitespace)?;
        if key != "music_directory" {
            return None;
        }
        let value = value.trim().trim_matches('"').trim();
        (!value.is_empty()).then(|| expand_home(value, home))
    })
}

fn mpd_config_path() -> Option<PathBuf> {
    let config_home = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))?;
    Some(config_home.join("mpd").join("mpd.conf"))
}

/// Reads `music_directory` from the user's MPD config, if there is one.
pub fn mpd_music_directory() -> Option<PathBuf> {
    let path = mpd_config_path()?;
    let text = std::fs::read_to_string(&path).ok()?;
    let found = parse_mpd_music_directory(&text, dirs::home_dir().as_deref());
    if let Some(directory) = found.as_ref() {
        debug!(
            "Music directory {} taken from {}",
            directory.display(),
            path.display()
        );
    }
    found
}
