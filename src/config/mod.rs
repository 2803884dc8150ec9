//! Configuration management for the call relay

pub mod file;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use url::Url;

use crate::{Error, Result};

/// Default ARI base URL
pub const DEFAULT_ARI_URL: &str = "http://localhost:8088";

/// Default Stasis application name
pub const DEFAULT_ARI_APP: &str = "voicebot_app";

/// Default remote speech endpoint
pub const DEFAULT_REMOTE_URL: &str = "ws://localhost:3001";

/// Default packet listener address
pub const DEFAULT_MEDIA_LISTEN: &str = "127.0.0.1:10000";

/// 16 kHz signed linear PCM, matching the remote endpoint's input format
pub const DEFAULT_MEDIA_FORMAT: &str = "slin16";

/// Sample rate of synthesized audio from the remote endpoint
pub const DEFAULT_INPUT_RATE: u32 = 24_000;

/// Sample rate of the telephony leg
pub const DEFAULT_OUTPUT_RATE: u32 = 16_000;

/// Default status API port
pub const DEFAULT_API_PORT: u16 = 18800;

/// Call relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telephony control connection
    pub ari: AriConfig,

    /// Remote speech endpoint
    pub remote: RemoteConfig,

    /// Packet ingestion listener
    pub media: MediaConfig,

    /// Resample filter process
    pub resample: ResampleConfig,

    /// Playback streaming objects
    pub playback: PlaybackConfig,

    /// Status API server
    pub api_server: ApiServerConfig,
}

/// Asterisk REST Interface connection settings
#[derive(Debug, Clone)]
pub struct AriConfig {
    /// Base URL, without the `/ari` suffix
    pub url: Url,

    /// ARI user
    pub username: String,

    /// ARI password
    pub password: SecretString,

    /// Stasis application that receives our calls
    pub app: String,
}

/// Remote speech endpoint settings
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// WebSocket URL opened once per call
    pub url: Url,
}

/// Packet listener settings
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Local address the listener binds
    pub listen: SocketAddr,

    /// Address handed to the telephony layer as the media destination;
    /// the bound listener address when unset
    pub external_host: Option<SocketAddr>,

    /// Media format requested for the external media leg
    pub format: String,
}

/// Resample filter settings
#[derive(Debug, Clone)]
pub struct ResampleConfig {
    /// Filter program
    pub program: String,

    /// Input sample rate (remote endpoint)
    pub input_rate: u32,

    /// Output sample rate (telephony leg)
    pub output_rate: u32,
}

/// Playback settings
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Directory holding the named streaming objects
    pub dir: PathBuf,
}

/// Status API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Serve the status API
    pub enabled: bool,

    /// Port to listen on
    pub port: u16,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            program: "sox".to_string(),
            input_rate: DEFAULT_INPUT_RATE,
            output_rate: DEFAULT_OUTPUT_RATE,
        }
    }
}

/// Default playback directory: `~/.local/share/callrelay/sounds`
fn default_playback_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("sounds"),
        |d| d.data_dir().join("callrelay").join("sounds"),
    )
}

fn parse_url(value: &str, what: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| Error::Config(format!("invalid {what} url '{value}': {e}")))
}

fn parse_socket_addr(value: &str, what: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("invalid {what} address '{value}': {e}")))
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from the standard config file and environment
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, reading the TOML file at `path` if given
    ///
    /// Precedence is env > toml > default.
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path);

        let ari_url = env("ARI_URL")
            .or(fc.ari.url)
            .unwrap_or_else(|| DEFAULT_ARI_URL.to_string());
        let ari = AriConfig {
            url: parse_url(&ari_url, "ARI")?,
            username: env("ARI_USERNAME").or(fc.ari.username).unwrap_or_default(),
            password: SecretString::from(
                env("ARI_PASSWORD").or(fc.ari.password).unwrap_or_default(),
            ),
            app: env("ARI_APP")
                .or(fc.ari.app)
                .unwrap_or_else(|| DEFAULT_ARI_APP.to_string()),
        };

        let remote_url = env("CALLRELAY_REMOTE_URL")
            .or(fc.remote.url)
            .unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string());
        let remote = RemoteConfig {
            url: parse_url(&remote_url, "remote")?,
        };

        let listen = env("CALLRELAY_MEDIA_LISTEN")
            .or(fc.media.listen)
            .unwrap_or_else(|| DEFAULT_MEDIA_LISTEN.to_string());
        let external_host = env("CALLRELAY_MEDIA_EXTERNAL_HOST")
            .or(fc.media.external_host)
            .map(|host| parse_socket_addr(&host, "media external host"))
            .transpose()?;
        let media = MediaConfig {
            listen: parse_socket_addr(&listen, "media listen")?,
            external_host,
            format: fc
                .media
                .format
                .unwrap_or_else(|| DEFAULT_MEDIA_FORMAT.to_string()),
        };

        let advertised = media.external_host.unwrap_or(media.listen);
        if advertised.ip().is_unspecified() {
            return Err(Error::Config(format!(
                "media destination {advertised} is not routable; set [media] external_host"
            )));
        }

        let defaults = ResampleConfig::default();
        let resample = ResampleConfig {
            program: env("CALLRELAY_SOX")
                .or(fc.resample.program)
                .unwrap_or(defaults.program),
            input_rate: fc.resample.input_rate.unwrap_or(defaults.input_rate),
            output_rate: fc.resample.output_rate.unwrap_or(defaults.output_rate),
        };
        if resample.input_rate == 0 || resample.output_rate == 0 {
            return Err(Error::Config("sample rates must be non-zero".to_string()));
        }

        let playback = PlaybackConfig {
            dir: env("CALLRELAY_SOUNDS_DIR")
                .or(fc.playback.dir)
                .map_or_else(default_playback_dir, PathBuf::from),
        };

        let api_server = ApiServerConfig {
            enabled: fc.server.enabled.unwrap_or(true),
            port: env("CALLRELAY_API_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_API_PORT),
        };

        Ok(Self {
            ari,
            remote,
            media,
            resample,
            playback,
            api_server,
        })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [ari]
            username = "voicebot_user"
            password = "hunter2"

            [media]
            listen = "127.0.0.1:12000"

            [server]
            enabled = false
            "#,
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.ari.username, "voicebot_user");
        assert_eq!(config.ari.password.expose_secret(), "hunter2");
        assert_eq!(config.media.listen.port(), 12000);
        assert_eq!(config.media.format, DEFAULT_MEDIA_FORMAT);
        assert_eq!(config.resample.input_rate, DEFAULT_INPUT_RATE);
        assert_eq!(config.resample.output_rate, DEFAULT_OUTPUT_RATE);
        assert!(!config.api_server.enabled);
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ari]\npassword = \"SuperSecret123\"\n").unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert!(!format!("{config:?}").contains("SuperSecret123"));
    }

    #[test]
    fn invalid_listen_address_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[media]\nlisten = \"not-an-address\"\n").unwrap();

        assert!(matches!(
            Config::load_from(Some(&path)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn wildcard_listen_requires_external_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[media]\nlisten = \"0.0.0.0:10000\"\n").unwrap();

        assert!(matches!(
            Config::load_from(Some(&path)),
            Err(Error::Config(_))
        ));

        std::fs::write(
            &path,
            "[media]\nlisten = \"0.0.0.0:10000\"\nexternal_host = \"10.0.0.5:10000\"\n",
        )
        .unwrap();
        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.media.listen.port(), 10000);
        assert_eq!(
            config.media.external_host,
            Some("10.0.0.5:10000".parse().unwrap())
        );
    }

    #[test]
    fn wildcard_external_host_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[media]\nexternal_host = \"0.0.0.0:10000\"\n").unwrap();

        assert!(matches!(
            Config::load_from(Some(&path)),
            Err(Error::Config(_))
        ));
    }
}
