//! The per-call pipeline slot
//!
//! Holds at most one active pipeline. Teardown claims and clears the slot
//! under its lock before releasing anything, so concurrent triggers see an
//! empty slot and do nothing.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;

use crate::pipeline::Pipeline;
use crate::telephony::{CallId, PlaybackId, Telephony};

/// Shared slot for a call's active pipeline
#[derive(Debug, Clone, Default)]
pub struct PipelineSlot {
    inner: Arc<Mutex<Option<Pipeline>>>,
}

impl PipelineSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Pipeline>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a pipeline is active
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Playback id of the active pipeline
    #[must_use]
    pub fn playback(&self) -> Option<PlaybackId> {
        self.lock().as_ref().map(|p| p.playback().clone())
    }

    /// Record a new pipeline
    ///
    /// # Errors
    ///
    /// Hands the pipeline back if one is already active
    pub fn install(&self, pipeline: Pipeline) -> std::result::Result<(), Pipeline> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(pipeline);
        }
        *slot = Some(pipeline);
        drop(slot);
        Ok(())
    }

    /// Write to the active pipeline; returns false if none is active or the
    /// write failed
    pub fn write(&self, call: &CallId, chunk: Bytes) -> bool {
        let mut slot = self.lock();
        let Some(pipeline) = slot.as_mut() else {
            return false;
        };
        match pipeline.write(chunk) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(call_id = %call, error = %e, "failed to write to pipeline");
                false
            }
        }
    }

    /// Take the active pipeline, leaving the slot empty
    #[must_use]
    pub fn claim(&self) -> Option<Pipeline> {
        self.lock().take()
    }

    /// Take the active pipeline only if it owns `playback`
    #[must_use]
    pub fn claim_if(&self, playback: &PlaybackId) -> Option<Pipeline> {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|p| p.playback() == playback) {
            slot.take()
        } else {
            None
        }
    }

    /// Tear down the active pipeline, if any
    ///
    /// Returns whether this call did the teardown.
    pub fn teardown(&self, call: &CallId, telephony: &Arc<dyn Telephony>) -> bool {
        self.claim().is_some_and(|pipeline| {
            pipeline.release(call, Arc::clone(telephony));
            true
        })
    }

    /// Tear down the active pipeline only if it owns `playback`
    ///
    /// Completion of an older, already torn down playback is a no-op.
    pub fn teardown_if(
        &self,
        call: &CallId,
        playback: &PlaybackId,
        telephony: &Arc<dyn Telephony>,
    ) -> bool {
        self.claim_if(playback).is_some_and(|pipeline| {
            pipeline.release(call, Arc::clone(telephony));
            true
        })
    }
}
