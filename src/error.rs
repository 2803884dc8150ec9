//! Error types for the call relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while relaying calls
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Telephony control request failed
    #[error("telephony error: {0}")]
    Telephony(String),

    /// Playback is unknown to the telephony layer (already finished or stopped)
    #[error("playback not found: {0}")]
    PlaybackNotFound(String),

    /// Remote speech endpoint connection error
    #[error("remote channel error: {0}")]
    Remote(String),

    /// Malformed message on the remote channel
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Resample pipeline could not be created or fed
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Packet listener error
    #[error("listener error: {0}")]
    Listener(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error means the playback had already ended
    #[must_use]
    pub const fn is_playback_gone(&self) -> bool {
        matches!(self, Self::PlaybackNotFound(_))
    }
}
