//! Active call sessions

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::slot::PipelineSlot;
use crate::remote::RemoteChannel;
use crate::telephony::{BridgeHandle, CallId, MediaTarget, PlaybackId};

/// State of one relayed call
#[derive(Debug)]
pub struct CallSession {
    pub call_id: CallId,
    pub caller: Option<String>,
    pub started_at: DateTime<Utc>,
    pub remote: Option<RemoteChannel>,
    pub media: Option<MediaTarget>,
    pub bridge: Option<BridgeHandle>,
    pub pipeline: PipelineSlot,
    /// Pipelines created over the life of the call
    pub utterances: u64,
}

impl CallSession {
    #[must_use]
    pub fn new(call_id: CallId, caller: Option<String>) -> Self {
        Self {
            call_id,
            caller,
            started_at: Utc::now(),
            remote: None,
            media: None,
            bridge: None,
            pipeline: PipelineSlot::new(),
            utterances: 0,
        }
    }

    /// Status view of the session
    #[must_use]
    pub fn summary(&self) -> CallSummary {
        CallSummary {
            call_id: self.call_id.to_string(),
            caller: self.caller.clone(),
            started_at: self.started_at,
            remote_connected: self.remote.is_some(),
            media_bridged: self.bridge.is_some(),
            pipeline_active: self.pipeline.is_active(),
            utterances: self.utterances,
        }
    }
}

/// Serializable snapshot of a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSummary {
    pub call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    pub started_at: DateTime<Utc>,
    pub remote_connected: bool,
    pub media_bridged: bool,
    pub pipeline_active: bool,
    pub utterances: u64,
}

/// Registry of active sessions, owned by the orchestrator
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<CallId, CallSession>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session; returns false if the call is already registered
    pub fn insert(&mut self, session: CallSession) -> bool {
        if self.sessions.contains_key(&session.call_id) {
            return false;
        }
        self.sessions.insert(session.call_id.clone(), session);
        true
    }

    #[must_use]
    pub fn get(&self, call: &CallId) -> Option<&CallSession> {
        self.sessions.get(call)
    }

    pub fn get_mut(&mut self, call: &CallId) -> Option<&mut CallSession> {
        self.sessions.get_mut(call)
    }

    pub fn remove(&mut self, call: &CallId) -> Option<CallSession> {
        self.sessions.remove(call)
    }

    /// Session whose active pipeline plays under `playback`
    #[must_use]
    pub fn find_by_playback(&self, playback: &PlaybackId) -> Option<&CallSession> {
        self.sessions
            .values()
            .find(|s| s.pipeline.playback().as_ref() == Some(playback))
    }

    /// Ids of every registered call
    #[must_use]
    pub fn call_ids(&self) -> Vec<CallId> {
        self.sessions.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Summaries ordered by start time
    #[must_use]
    pub fn summaries(&self) -> Vec<CallSummary> {
        let mut summaries: Vec<_> = self.sessions.values().map(CallSession::summary).collect();
        summaries.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.call_id.cmp(&b.call_id))
        });
        summaries
    }
}
