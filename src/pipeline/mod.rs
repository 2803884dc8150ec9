//! Resample pipeline
//!
//! One pipeline per utterance: a filter process writing into the call's
//! streaming object, played into the call under a fresh playback id.

pub mod fifo;
mod resample;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;

pub use resample::{FilterLauncher, FilterProcess, SoxLauncher};

use crate::Result;
use crate::telephony::{CallId, PlaybackId, Telephony};

/// The resources of one active pipeline
pub struct Pipeline {
    playback: PlaybackId,
    stream_path: PathBuf,
    process: Box<dyn FilterProcess>,
    play_settled: Option<oneshot::Receiver<()>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("playback", &self.playback)
            .field("stream_path", &self.stream_path)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Playback id the telephony layer reports completion under
    #[must_use]
    pub const fn playback(&self) -> &PlaybackId {
        &self.playback
    }

    /// Path of the streaming object
    #[must_use]
    pub fn stream_path(&self) -> &Path {
        &self.stream_path
    }

    /// Media reference to hand to the telephony layer
    #[must_use]
    pub fn media_ref(&self) -> String {
        fifo::media_ref(&self.stream_path)
    }

    /// Track the in-flight play request for this pipeline
    ///
    /// `settled` fires once the telephony layer has answered the request.
    /// Release waits for it before stopping, so a stop can never overtake
    /// the play it is meant to cancel.
    pub fn track_play(&mut self, settled: oneshot::Receiver<()>) {
        self.play_settled = Some(settled);
    }

    /// Append decoded audio to the filter input
    ///
    /// # Errors
    ///
    /// Returns `Error::Pipeline` if the filter input is gone
    pub fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.process.write(chunk)
    }

    /// Release every resource
    ///
    /// Stops the playback in the background once its play request has
    /// settled, kills the filter and removes the streaming object. Failures
    /// are logged; release always completes.
    pub fn release(mut self, call: &CallId, telephony: Arc<dyn Telephony>) {
        let playback = self.playback.clone();
        let stop_call = call.clone();
        let play_settled = self.play_settled.take();
        tokio::spawn(async move {
            if let Some(settled) = play_settled {
                // a dropped sender means the request task is gone
                let _ = settled.await;
            }
            match telephony.stop_playback(&playback).await {
                Ok(()) => tracing::debug!(call_id = %stop_call, %playback, "playback stopped"),
                Err(e) if e.is_playback_gone() => {
                    tracing::debug!(call_id = %stop_call, %playback, "playback already finished");
                }
                Err(e) => {
                    tracing::warn!(call_id = %stop_call, %playback, error = %e, "failed to stop playback");
                }
            }
        });

        if let Err(e) = self.process.kill() {
            tracing::warn!(call_id = %call, error = %e, "failed to kill filter process");
        }

        if let Err(e) = fifo::remove(&self.stream_path) {
            tracing::warn!(call_id = %call, error = %e, "failed to remove streaming object");
        }

        tracing::info!(call_id = %call, playback = %self.playback, "pipeline torn down");
    }
}

/// Builds pipelines for calls
#[derive(Clone)]
pub struct PipelineFactory {
    dir: PathBuf,
    launcher: Arc<dyn FilterLauncher>,
}

impl PipelineFactory {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, launcher: Arc<dyn FilterLauncher>) -> Self {
        Self {
            dir: dir.into(),
            launcher,
        }
    }

    /// Directory holding the streaming objects
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the streaming object and start the filter writing into it
    ///
    /// A stale object at the call's path is replaced. On failure nothing is
    /// left behind.
    ///
    /// # Errors
    ///
    /// Returns `Error::Pipeline` if either step fails
    pub fn start(&self, call: &CallId) -> Result<Pipeline> {
        let stream_path = fifo::stream_path(&self.dir, call);
        fifo::create(&stream_path)?;

        let process = match self.launcher.launch(call, &stream_path) {
            Ok(process) => process,
            Err(e) => {
                let _ = fifo::remove(&stream_path);
                return Err(e);
            }
        };

        Ok(Pipeline {
            playback: PlaybackId::generate(),
            stream_path,
            process,
            play_settled: None,
        })
    }
}
