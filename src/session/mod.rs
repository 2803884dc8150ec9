//! Call sessions and their orchestration
//!
//! The orchestrator owns every [`CallSession`] and is the only place that
//! changes per-call state. Telephony notifications, remote channel events
//! and the results of background requests all reach it as [`Event`]s on one
//! queue, so per-call transitions are serialized.

mod orchestrator;
mod registry;
mod slot;

pub use orchestrator::{MediaSettings, Orchestrator};
pub use registry::{CallSession, CallSummary, SessionRegistry};
pub use slot::PipelineSlot;

use crate::remote::{RemoteChannel, RemoteEvent};
use crate::telephony::{BridgeHandle, CallId, MediaTarget, PlaybackId, TelephonyEvent};

/// Input to the orchestrator
#[derive(Debug)]
pub enum Event {
    /// Notification from the telephony layer
    Telephony(TelephonyEvent),
    /// The call was answered and its remote channel opened
    RemoteOpened {
        call_id: CallId,
        channel: RemoteChannel,
    },
    /// Answering or opening the remote channel failed
    RemoteFailed { call_id: CallId, error: String },
    /// The media target was created and bridged to the call
    MediaReady {
        call_id: CallId,
        target: MediaTarget,
        bridge: BridgeHandle,
    },
    /// Creating or bridging the media target failed
    MediaFailed {
        call_id: CallId,
        target: Option<MediaTarget>,
        error: String,
    },
    /// Something arrived on a call's remote channel
    Remote { call_id: CallId, event: RemoteEvent },
    /// The telephony layer rejected a playback request
    PlaybackFailed {
        call_id: CallId,
        playback: PlaybackId,
        error: String,
    },
}

impl From<TelephonyEvent> for Event {
    fn from(event: TelephonyEvent) -> Self {
        Self::Telephony(event)
    }
}
