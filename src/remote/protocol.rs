//! Speech endpoint wire protocol
//!
//! Outbound frames are raw PCM. Inbound frames are JSON text:
//!
//! ```json
//! { "data": { "serverContent": {
//!     "interrupted": true,
//!     "modelTurn": { "parts": [ { "inlineData": { "data": "<base64 pcm>" } } ] }
//! } } }
//! ```
//!
//! Only `interrupted` and the first part's inline data are consumed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use serde::Deserialize;

use crate::{Error, Result};

/// What an inbound frame means to the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// A chunk of synthesized response audio, decoded
    Audio(Bytes),
    /// The current utterance was interrupted
    Interrupted,
    /// Anything else; ignored
    Other,
    /// The connection ended; `reason` is `None` when closed locally
    Closed { reason: Option<String> },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeData {
    #[serde(default)]
    server_content: Option<ServerContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    interrupted: Option<bool>,
    #[serde(default)]
    model_turn: Option<ModelTurn>,
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

/// Classify one inbound text frame
///
/// Interruption wins over audio carried in the same frame.
///
/// # Errors
///
/// Returns `Error::Protocol` for frames that are not the expected JSON
/// envelope or whose audio is not valid base64
pub fn classify(text: &str) -> Result<RemoteEvent> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| Error::Protocol(format!("bad frame: {e}")))?;

    let Some(content) = envelope.data.server_content else {
        return Ok(RemoteEvent::Other);
    };

    if content.interrupted == Some(true) {
        return Ok(RemoteEvent::Interrupted);
    }

    let encoded = content
        .model_turn
        .and_then(|turn| turn.parts.into_iter().next())
        .and_then(|part| part.inline_data)
        .map(|inline| inline.data);

    match encoded {
        Some(encoded) if !encoded.is_empty() => {
            let audio = B64
                .decode(encoded.as_bytes())
                .map_err(|e| Error::Protocol(format!("bad audio encoding: {e}")))?;
            Ok(RemoteEvent::Audio(Bytes::from(audio)))
        }
        _ => Ok(RemoteEvent::Other),
    }
}
