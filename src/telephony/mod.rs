//! Telephony control collaborator
//!
//! The relay drives calls through the `Telephony` trait: answer, hangup,
//! external media legs, bridges and playbacks. `AriClient` implements it
//! against the Asterisk REST Interface.

mod ari;
mod events;

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;

pub use ari::{AriClient, AriEvents};
pub use events::{TelephonyEvent, parse_event};

use crate::Result;

/// Stable identifier the telephony layer assigns to a call
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(String);

impl CallId {
    /// Wrap a telephony channel id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw channel id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of one playback operation against a call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaybackId(String);

impl PlaybackId {
    /// Allocate a fresh playback id
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an id reported by the telephony layer
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw playback id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for the secondary leg that taps call audio into the listener
#[derive(Debug, Clone)]
pub struct MediaTargetParams {
    /// Channel id to assign to the new leg
    pub channel_id: String,
    /// Stasis application the leg joins
    pub app: String,
    /// Where the telephony layer sends media packets
    pub external_host: SocketAddr,
    /// Media format, e.g. `slin16`
    pub format: String,
}

/// A created media relay target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTarget {
    /// Channel id of the external media leg
    pub channel_id: String,
    /// Address media packets for this leg are sent from, when reported
    pub source: Option<SocketAddr>,
}

/// A bridge joining a call with its media target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeHandle {
    pub bridge_id: String,
}

/// Call control operations the relay consumes
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Answer an incoming call
    async fn answer(&self, call: &CallId) -> Result<()>;

    /// Hang up a channel (a call or a media target leg)
    ///
    /// Hanging up a channel that is already gone is not an error.
    async fn hangup(&self, channel_id: &str) -> Result<()>;

    /// Create the external media leg for a call
    async fn create_media_target(&self, params: &MediaTargetParams) -> Result<MediaTarget>;

    /// Bridge a call with its media target
    async fn bridge(&self, call: &CallId, target: &MediaTarget) -> Result<BridgeHandle>;

    /// Destroy a bridge
    async fn destroy_bridge(&self, bridge: &BridgeHandle) -> Result<()>;

    /// Start playing `media` into a call under the given playback id
    ///
    /// Returns once the telephony layer accepted the request; completion is
    /// reported later as `TelephonyEvent::PlaybackFinished`.
    async fn play(&self, call: &CallId, media: &str, playback: &PlaybackId) -> Result<()>;

    /// Stop a playback
    ///
    /// Returns `Error::PlaybackNotFound` if it had already finished.
    async fn stop_playback(&self, playback: &PlaybackId) -> Result<()>;
}
