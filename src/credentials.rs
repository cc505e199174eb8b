//! Spotify application credentials: client id from config, secret from config or the OS keyring.

use keyring::Entry;
use thiserror::Error;

use crate::config::RemoteConfig;
use crate::remote::spotify::SpotifyCredentials;

const SPOTIFY_KEYRING_SERVICE: &str = "nowplaying.remote.spotify";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("`spotify_client_id` is not configured under [remote]")]
    MissingClientId,
    #[error("no Spotify client secret for client '{0}' in config.toml or the system keyring")]
    MissingSecret(String),
    #[error("the Spotify client secret is empty")]
    EmptySecret,
    #[error(
        "system keyring {} failed for client '{}': {}{}",
        .operation,
        .client_id,
        .source,
        secret_service_hint(.source)
    )]
    Keyring {
        operation: &'static str,
        client_id: String,
        source: keyring::Error,
    },
}

/// Extra advice for Linux sessions without a Secret Service provider.
fn secret_service_hint(error: &keyring::Error) -> &'static str {
    if error
        .to_string()
        .contains("org.freedesktop.DBus.Error.ServiceUnknown")
    {
        ". Start GNOME Keyring or KeePassXC Secret Service, or set `spotify_client_secret` in config.toml"
    } else {
        ""
    }
}

fn keyring_failure(operation: &'static str, client_id: &str) -> impl FnOnce(keyring::Error) -> CredentialError {
    let client_id = client_id.to_string();
    move |source| CredentialError::Keyring {
        operation,
        client_id,
        source,
    }
}

fn keyring_entry(client_id: &str) -> Result<Entry, CredentialError> {
    Entry::new(SPOTIFY_KEYRING_SERVICE, client_id).map_err(keyring_failure("open", client_id))
}

fn configured_client_id(remote: &RemoteConfig) -> Result<&str, CredentialError> {
    let client_id = remote.spotify_client_id.trim();
    if client_id.is_empty() {
        return Err(CredentialError::MissingClientId);
    }
    Ok(client_id)
}

fn keyring_secret(client_id: &str) -> Result<Option<String>, CredentialError> {
    match keyring_entry(client_id)?.get_password() {
        Ok(secret) => Ok(Some(secret)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(error) => Err(keyring_failure("read", client_id)(error)),
    }
}

/// Saves `secret` in the keyring under the configured client id.
pub fn store_spotify_client_secret(remote: &RemoteConfig, secret: &str) -> Result<(), CredentialError> {
    let client_id = configured_client_id(remote)?;
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(CredentialError::EmptySecret);
    }
    keyring_entry(client_id)?
        .set_password(secret)
        .map_err(keyring_failure("write", client_id))
}

/// Client id plus secret. A secret in config wins over the keyring copy.
pub fn spotify_credentials(remote: &RemoteConfig) -> Result<SpotifyCredentials, CredentialError> {
    spotify_credentials_with(remote, keyring_secret)
}

fn spotify_credentials_with<F>(
    remote: &RemoteConfig,
    stored_secret: F,
) -> Result<SpotifyCredentials, CredentialError>
where
    F: FnOnce(&str) -> Result<Option<String>, CredentialError>,
{
    let client_id = configured_client_id(remote)?;
    let configured_secret = remote.spotify_client_secret.trim();
    let client_secret = if configured_secret.is_empty() {
        stored_secret(client_id)?
            .map(|secret| secret.trim().to_string())
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| CredentialError::MissingSecret(client_id.to_string()))?
    } else {
        configured_secret.to_string()
    };

    Ok(SpotifyCredentials {
        client_id: client_id.to_string(),
        client_secret,
    })
}
