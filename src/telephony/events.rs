//! Telephony event notifications
//!
//! Decodes ARI event frames into the handful of notifications the relay acts on.

use serde::Deserialize;

use super::{CallId, PlaybackId};

/// Channel name prefix of external media legs created by the relay
const MEDIA_CHANNEL_PREFIX: &str = "UnicastRTP/";

/// Notifications emitted by the telephony layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyEvent {
    /// A call entered the application
    CallStart {
        call_id: CallId,
        /// Caller number, when known
        caller: Option<String>,
    },
    /// A call left the application (hung up or redirected)
    CallEnd { call_id: CallId },
    /// A playback ended, either exhausted or stopped
    PlaybackFinished { playback_id: PlaybackId },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AriEvent {
    StasisStart { channel: AriChannel },
    StasisEnd { channel: AriChannel },
    PlaybackFinished { playback: AriPlayback },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AriChannel {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    caller: Option<AriCaller>,
}

#[derive(Debug, Deserialize)]
struct AriCaller {
    #[serde(default)]
    number: String,
}

#[derive(Debug, Deserialize)]
struct AriPlayback {
    id: String,
}

impl AriChannel {
    fn is_media_leg(&self) -> bool {
        self.name.starts_with(MEDIA_CHANNEL_PREFIX)
    }
}

/// Decode one ARI event frame
///
/// Returns `None` for events the relay does not act on, for the relay's own
/// external media legs, and for frames that are not valid events.
#[must_use]
pub fn parse_event(text: &str) -> Option<TelephonyEvent> {
    let event: AriEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable telephony event");
            return None;
        }
    };

    match event {
        AriEvent::StasisStart { channel } if !channel.is_media_leg() => {
            let caller = channel
                .caller
                .map(|c| c.number)
                .filter(|n| !n.is_empty());
            Some(TelephonyEvent::CallStart {
                call_id: CallId::new(channel.id),
                caller,
            })
        }
        AriEvent::StasisEnd { channel } if !channel.is_media_leg() => {
            Some(TelephonyEvent::CallEnd {
                call_id: CallId::new(channel.id),
            })
        }
        AriEvent::PlaybackFinished { playback } => Some(TelephonyEvent::PlaybackFinished {
            playback_id: PlaybackId::new(playback.id),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stasis_start_is_call_start() {
        let event = parse_event(
            r#"{
                "type": "StasisStart",
                "application": "voicebot_app",
                "args": [],
                "channel": {
                    "id": "1700000000.42",
                    "name": "PJSIP/trunk-00000001",
                    "state": "Ring",
                    "caller": { "name": "", "number": "5551234" }
                }
            }"#,
        );

        assert_eq!(
            event,
            Some(TelephonyEvent::CallStart {
                call_id: CallId::new("1700000000.42"),
                caller: Some("5551234".to_string()),
            })
        );
    }

    #[test]
    fn media_leg_events_are_ignored() {
        let start = r#"{"type":"StasisStart","channel":{"id":"media-1","name":"UnicastRTP/127.0.0.1:10000-0x7f"}}"#;
        let end = r#"{"type":"StasisEnd","channel":{"id":"media-1","name":"UnicastRTP/127.0.0.1:10000-0x7f"}}"#;
        assert_eq!(parse_event(start), None);
        assert_eq!(parse_event(end), None);
    }

    #[test]
    fn stasis_end_is_call_end() {
        let event = parse_event(r#"{"type":"StasisEnd","channel":{"id":"c1","name":"PJSIP/x"}}"#);
        assert_eq!(
            event,
            Some(TelephonyEvent::CallEnd {
                call_id: CallId::new("c1")
            })
        );
    }

    #[test]
    fn playback_finished_carries_id() {
        let event = parse_event(
            r#"{"type":"PlaybackFinished","playback":{"id":"pb-7","media_uri":"sound:/tmp/x","state":"done"}}"#,
        );
        assert_eq!(
            event,
            Some(TelephonyEvent::PlaybackFinished {
                playback_id: PlaybackId::new("pb-7")
            })
        );
    }

    #[test]
    fn unrelated_and_malformed_frames_are_ignored() {
        assert_eq!(parse_event(r#"{"type":"ChannelDtmfReceived","digit":"1"}"#), None);
        assert_eq!(parse_event("not json"), None);
        assert_eq!(parse_event(r#"{"type":"StasisStart"}"#), None);
    }
}
