mod config;
mod credentials;
mod filename_tokenizer;
mod local_artwork;
mod metadata;
mod normalize;
mod now_playing_summary;
mod remote;
mod resolver;
mod track_record;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info, warn};

use config::{load_or_create_config, RemoteConfig, RemoteProviderKind};
use metadata::metadata_tags::ContainerTagReader;
use now_playing_summary::summary_text;
use remote::deezer::DeezerProvider;
use remote::http::HttpClient;
use remote::spotify::SpotifyProvider;
use remote::RemoteLookup;
use resolver::{MetadataResolver, ResolverSettings};

/// Resolve display metadata (title, artist, album, year, artwork) for audio tracks.
#[derive(Debug, Parser)]
#[command(name = "nowplaying", version)]
struct Args {
    /// Track files. Relative paths missing from the working directory are looked
    /// up under the music directory.
    #[arg(required_unless_present = "store_spotify_secret")]
    tracks: Vec<PathBuf>,
    /// Remote provider used to fill gaps, overriding the config file.
    #[arg(long, value_enum)]
    provider: Option<RemoteProviderKind>,
    /// Skip remote lookups entirely.
    #[arg(long)]
    offline: bool,
    /// Music library root, overriding the config file.
    #[arg(long, value_name = "DIR")]
    music_dir: Option<PathBuf>,
    /// Config file path. Defaults to `<config dir>/nowplaying/config.toml`.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print each record as one JSON line.
    #[arg(long)]
    json: bool,
    #[arg(short, long)]
    verbose: bool,
    /// Save the Spotify client secret for the configured client id in the system keyring.
    #[arg(long, value_name = "SECRET")]
    store_spotify_secret: Option<String>,
}

fn build_remote_lookup(remote: &RemoteConfig, provider: RemoteProviderKind) -> Option<RemoteLookup> {
    let http = HttpClient::new(
        Duration::from_millis(remote.request_timeout_ms),
        Duration::from_millis(remote.min_request_interval_ms),
    );
    match provider {
        RemoteProviderKind::Disabled => None,
        RemoteProviderKind::Deezer => Some(RemoteLookup::new(Box::new(DeezerProvider::new(http)))),
        RemoteProviderKind::Spotify => match credentials::spotify_credentials(remote) {
            Ok(credentials) => Some(RemoteLookup::new(Box::new(SpotifyProvider::new(
                http,
                credentials,
            )))),
            Err(err) => {
                warn!("Spotify lookups disabled: {err}");
                None
            }
        },
    }
}

/// Playback daemons report library-relative paths; those are joined onto the music root.
fn locate_track(argument: &Path, music_directory: Option<&Path>) -> PathBuf {
    if argument.is_relative() && !argument.exists() {
        if let Some(root) = music_directory {
            return root.join(argument);
        }
    }
    argument.to_path_buf()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_file = match args.config.clone() {
        Some(path) => path,
        None => config::default_config_path()?,
    };
    let creating_config = !config_file.exists();
    let config = load_or_create_config(&config_file)?;

    let mut clog = colog::default_builder();
    if args.verbose {
        clog.filter(None, log::LevelFilter::Debug);
    } else {
        clog.parse_filters(config.logging.filter_directives());
    }
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    if creating_config {
        info!(
            "Config file not found. Created default config. path={}",
            config_file.display()
        );
    }

    if let Some(secret) = args.store_spotify_secret.as_deref() {
        credentials::store_spotify_client_secret(&config.remote, secret)?;
        info!(
            "Spotify client secret saved to the system keyring for client '{}'",
            config.remote.spotify_client_id.trim()
        );
        if args.tracks.is_empty() {
            return Ok(());
        }
    }

    let music_directory = args.music_dir.clone().or_else(|| config.music_directory());
    match music_directory.as_ref() {
        Some(directory) => debug!("Music directory: {}", directory.display()),
        None => debug!("No music directory configured; artwork search is unbounded"),
    }

    let provider = if args.offline {
        RemoteProviderKind::Disabled
    } else {
        args.provider.unwrap_or(config.remote.provider)
    };
    let remote = build_remote_lookup(&config.remote, provider);

    let mut resolver = MetadataResolver::new(
        Box::new(ContainerTagReader),
        remote,
        ResolverSettings {
            music_directory: music_directory.clone(),
            artwork_search_depth: config.library.artwork_search_depth,
        },
    );

    let mut failures = 0usize;
    for argument in &args.tracks {
        let track_path = locate_track(argument, music_directory.as_deref());
        match resolver.resolve(&track_path) {
            Ok(record) => {
                if args.json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    println!("{}\n", summary_text(&record));
                }
            }
            Err(err) => {
                failures += 1;
                error!("{err}");
                if args.json {
                    println!("null");
                }
            }
        }
    }

    if provider != RemoteProviderKind::Disabled && resolver.remote_disabled() {
        info!("Remote lookups were unavailable for this run");
    }
    if failures > 0 {
        return Err(format!("{failures} track(s) could not be resolved").into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{build_remote_lookup, locate_track, Args};
    use crate::config::{LoggingConfig, RemoteConfig, RemoteProviderKind};
    use clap::Parser;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_locate_track_joins_missing_relative_paths_onto_music_root() {
        let root = Path::new("/srv/music");
        assert_eq!(
            locate_track(Path::new("nowplaying_missing/Artist/01.flac"), Some(root)),
            root.join("nowplaying_missing/Artist/01.flac")
        );
        assert_eq!(
            locate_track(Path::new("/abs/01.flac"), Some(root)),
            PathBuf::from("/abs/01.flac")
        );
        assert_eq!(
            locate_track(Path::new("nowplaying_missing/01.flac"), None),
            PathBuf::from("nowplaying_missing/01.flac")
        );
    }

    #[test]
    fn test_disabled_and_unconfigured_providers_build_no_lookup() {
        let remote = RemoteConfig::default();
        assert!(build_remote_lookup(&remote, RemoteProviderKind::Disabled).is_none());
        assert!(build_remote_lookup(&remote, RemoteProviderKind::Spotify).is_none());
        let deezer = build_remote_lookup(&remote, RemoteProviderKind::Deezer)
            .expect("deezer needs no credentials");
        assert_eq!(deezer.provider_name(), "Deezer");
    }

    #[test]
    fn test_config_filter_directives_drive_backend_level() {
        let logging = LoggingConfig {
            level: "warn,nowplaying::remote=debug".to_string(),
        };
        let mut clog = colog::default_builder();
        clog.parse_filters(logging.filter_directives());
        assert_eq!(clog.build().filter(), log::LevelFilter::Debug);

        let mut clog = colog::default_builder();
        clog.parse_filters(LoggingConfig::default().filter_directives());
        assert_eq!(clog.build().filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_args_parse_provider_override_and_flags() {
        let args = Args::try_parse_from([
            "nowplaying",
            "--provider",
            "none",
            "--json",
            "-v",
            "Artist/01.flac",
        ])
        .expect("arguments should parse");
        assert_eq!(args.provider, Some(RemoteProviderKind::Disabled));
        assert!(args.json);
        assert!(args.verbose);
        assert_eq!(args.tracks, vec![PathBuf::from("Artist/01.flac")]);

        assert!(Args::try_parse_from(["nowplaying"]).is_err());
        assert!(Args::try_parse_from(["nowplaying", "--store-spotify-secret", "s3cret"]).is_ok());
    }
}
