//! TOML configuration file loading
//!
//! Supports `~/.config/callrelay/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfigFile {
    /// Telephony control (ARI) connection
    #[serde(default)]
    pub ari: AriFileConfig,

    /// Remote speech endpoint
    #[serde(default)]
    pub remote: RemoteFileConfig,

    /// Packet ingestion listener
    #[serde(default)]
    pub media: MediaFileConfig,

    /// Resample filter process
    #[serde(default)]
    pub resample: ResampleFileConfig,

    /// Playback streaming objects
    #[serde(default)]
    pub playback: PlaybackFileConfig,

    /// Status API server
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// ARI connection settings
#[derive(Debug, Default, Deserialize)]
pub struct AriFileConfig {
    /// Base URL (e.g. "http://localhost:8088")
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Stasis application name
    pub app: Option<String>,
}

/// Remote speech endpoint settings
#[derive(Debug, Default, Deserialize)]
pub struct RemoteFileConfig {
    /// WebSocket URL (e.g. "ws://localhost:3001")
    pub url: Option<String>,
}

/// Packet listener settings
#[derive(Debug, Default, Deserialize)]
pub struct MediaFileConfig {
    /// Local address the listener binds (e.g. "127.0.0.1:10000")
    pub listen: Option<String>,
    /// Address the telephony layer sends caller audio to, when it differs
    /// from the listen address (e.g. "10.0.0.5:10000")
    pub external_host: Option<String>,
    /// Media format requested from the telephony layer
    pub format: Option<String>,
}

/// Resample filter settings
#[derive(Debug, Default, Deserialize)]
pub struct ResampleFileConfig {
    /// Filter program (defaults to "sox")
    pub program: Option<String>,
    /// Sample rate of audio received from the remote endpoint
    pub input_rate: Option<u32>,
    /// Sample rate of audio played into the call
    pub output_rate: Option<u32>,
}

/// Playback settings
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Directory holding the named streaming objects
    pub dir: Option<String>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Status API port
    pub port: Option<u16>,
    /// Enable the status API
    pub enabled: Option<bool>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `RelayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> RelayConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return RelayConfigFile::default();
    };

    if !path.exists() {
        return RelayConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                RelayConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RelayConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the contents are not valid TOML for this schema
pub fn parse_config(content: &str) -> crate::Result<RelayConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/callrelay/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("callrelay").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let fc = parse_config(
            r#"
            [ari]
            url = "http://pbx.local:8088"
            app = "bot"

            [resample]
            input_rate = 22050
            "#,
        )
        .unwrap();

        assert_eq!(fc.ari.url.as_deref(), Some("http://pbx.local:8088"));
        assert_eq!(fc.ari.app.as_deref(), Some("bot"));
        assert!(fc.ari.username.is_none());
        assert_eq!(fc.resample.input_rate, Some(22050));
        assert!(fc.server.port.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(parse_config("[ari\nurl = ").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file(Some(&dir.path().join("absent.toml")));
        assert!(fc.remote.url.is_none());
    }
}
