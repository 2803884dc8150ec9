//! Session orchestrator

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::Event;
use super::registry::{CallSession, CallSummary, SessionRegistry};
use crate::Result;
use crate::media::RouteTable;
use crate::pipeline::PipelineFactory;
use crate::remote::{RemoteChannel, RemoteConnector, RemoteEvent};
use crate::telephony::{
    BridgeHandle, CallId, MediaTarget, MediaTargetParams, PlaybackId, Telephony, TelephonyEvent,
};

/// Queued events before background tasks wait for the orchestrator
const EVENT_CAPACITY: usize = 1024;

/// How long shutdown waits for telephony cleanup
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Where and how the telephony layer should send call media
#[derive(Debug, Clone)]
pub struct MediaSettings {
    /// Stasis application the media target joins
    pub app: String,
    /// Address of the packet listener
    pub external_host: SocketAddr,
    /// Media format of the target leg
    pub format: String,
}

/// Drives every call session
///
/// All per-call state changes happen in [`Orchestrator::handle`]; requests
/// to the telephony layer and the remote endpoint run in background tasks
/// that report back as [`Event`]s.
pub struct Orchestrator {
    sessions: SessionRegistry,
    routes: RouteTable,
    telephony: Arc<dyn Telephony>,
    connector: Arc<dyn RemoteConnector>,
    pipelines: PipelineFactory,
    media: MediaSettings,
    events: mpsc::Sender<Event>,
    status: watch::Sender<Vec<CallSummary>>,
}

impl Orchestrator {
    /// Create an orchestrator and the receiving end of its event queue
    #[must_use]
    pub fn new(
        telephony: Arc<dyn Telephony>,
        connector: Arc<dyn RemoteConnector>,
        pipelines: PipelineFactory,
        media: MediaSettings,
        routes: RouteTable,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (events, rx) = mpsc::channel(EVENT_CAPACITY);
        let (status, _) = watch::channel(Vec::new());
        let orchestrator = Self {
            sessions: SessionRegistry::new(),
            routes,
            telephony,
            connector,
            pipelines,
            media,
            events,
            status,
        };
        (orchestrator, rx)
    }

    /// Sender for feeding events into the queue
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.events.clone()
    }

    /// Live view of the active calls
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<CallSummary>> {
        self.status.subscribe()
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    #[must_use]
    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Process events until shutdown is requested, then end every session
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!("session orchestrator running");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }

        self.shutdown().await;
        tracing::info!("session orchestrator stopped");
    }

    /// Apply one event
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Telephony(TelephonyEvent::CallStart { call_id, caller }) => {
                self.on_call_start(call_id, caller);
            }
            Event::Telephony(TelephonyEvent::CallEnd { call_id }) => {
                if self.end_session(&call_id, false).is_some() {
                    tracing::info!(%call_id, "call ended");
                }
            }
            Event::Telephony(TelephonyEvent::PlaybackFinished { playback_id }) => {
                self.on_playback_finished(&playback_id);
            }
            Event::RemoteOpened { call_id, channel } => self.on_remote_opened(call_id, channel),
            Event::RemoteFailed { call_id, error } => {
                tracing::warn!(%call_id, %error, "failed to connect call");
                self.end_session(&call_id, true);
            }
            Event::MediaReady {
                call_id,
                target,
                bridge,
            } => self.on_media_ready(call_id, target, bridge),
            Event::MediaFailed {
                call_id,
                target,
                error,
            } => self.on_media_failed(&call_id, target, &error),
            Event::Remote { call_id, event } => self.on_remote_event(&call_id, event),
            Event::PlaybackFailed {
                call_id,
                playback,
                error,
            } => {
                tracing::warn!(%call_id, %playback, %error, "playback request failed");
                if let Some(session) = self.sessions.get(&call_id) {
                    session
                        .pipeline
                        .teardown_if(&call_id, &playback, &self.telephony);
                }
            }
        }

        self.publish();
    }

    /// End every session, waiting briefly for telephony cleanup
    pub async fn shutdown(&mut self) {
        let calls = self.sessions.call_ids();
        if !calls.is_empty() {
            tracing::info!(count = calls.len(), "ending active calls");
        }

        let cleanups: Vec<_> = calls
            .iter()
            .filter_map(|call| self.end_session(call, true))
            .collect();
        self.publish();

        if tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(cleanups))
            .await
            .is_err()
        {
            tracing::warn!("telephony cleanup did not finish before shutdown");
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.sessions.summaries());
    }

    fn on_call_start(&mut self, call_id: CallId, caller: Option<String>) {
        if !self
            .sessions
            .insert(CallSession::new(call_id.clone(), caller.clone()))
        {
            tracing::debug!(%call_id, "call already registered");
            return;
        }
        tracing::info!(%call_id, caller = caller.as_deref().unwrap_or("unknown"), "incoming call");

        let telephony = Arc::clone(&self.telephony);
        let connector = Arc::clone(&self.connector);
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match open_call(telephony.as_ref(), connector.as_ref(), &call_id).await {
                Ok(channel) => Event::RemoteOpened { call_id, channel },
                Err(e) => Event::RemoteFailed {
                    call_id,
                    error: e.to_string(),
                },
            };
            let _ = events.send(event).await;
        });
    }

    fn on_remote_opened(&mut self, call_id: CallId, mut channel: RemoteChannel) {
        let Some(session) = self.sessions.get_mut(&call_id) else {
            tracing::debug!(%call_id, "call ended before its remote channel opened");
            return;
        };

        if let Some(inbound) = channel.take_inbound() {
            tokio::spawn(forward_remote(call_id.clone(), inbound, self.events.clone()));
        }
        session.remote = Some(channel);
        tracing::info!(%call_id, "call answered, remote channel attached");

        let params = MediaTargetParams {
            channel_id: format!("media-{call_id}"),
            app: self.media.app.clone(),
            external_host: self.media.external_host,
            format: self.media.format.clone(),
        };
        let telephony = Arc::clone(&self.telephony);
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match telephony.create_media_target(&params).await {
                Ok(target) => match telephony.bridge(&call_id, &target).await {
                    Ok(bridge) => Event::MediaReady {
                        call_id,
                        target,
                        bridge,
                    },
                    Err(e) => Event::MediaFailed {
                        call_id,
                        target: Some(target),
                        error: e.to_string(),
                    },
                },
                Err(e) => Event::MediaFailed {
                    call_id,
                    target: None,
                    error: e.to_string(),
                },
            };
            let _ = events.send(event).await;
        });
    }

    fn on_media_ready(&mut self, call_id: CallId, target: MediaTarget, bridge: BridgeHandle) {
        let Some(session) = self.sessions.get_mut(&call_id) else {
            tracing::debug!(%call_id, "call ended before media was bridged");
            release_media(
                Arc::clone(&self.telephony),
                call_id,
                Some(target),
                Some(bridge),
                false,
            );
            return;
        };

        match (target.source, session.remote.as_ref()) {
            (Some(source), Some(remote)) => {
                self.routes
                    .insert(source, call_id.clone(), remote.outbound());
                tracing::info!(%call_id, %source, "call media bridged");
            }
            (None, _) => {
                tracing::warn!(%call_id, "media target reported no source address; caller audio will not be relayed");
            }
            (Some(_), None) => {}
        }

        session.media = Some(target);
        session.bridge = Some(bridge);
    }

    fn on_media_failed(&mut self, call_id: &CallId, target: Option<MediaTarget>, error: &str) {
        tracing::warn!(%call_id, %error, "failed to bridge call media");

        if let Some(session) = self.sessions.get_mut(call_id) {
            session.media = target;
            self.end_session(call_id, true);
        } else {
            release_media(Arc::clone(&self.telephony), call_id.clone(), target, None, false);
        }
    }

    fn on_remote_event(&mut self, call_id: &CallId, event: RemoteEvent) {
        match event {
            RemoteEvent::Audio(chunk) => self.on_audio(call_id, chunk),
            RemoteEvent::Interrupted => {
                let Some(session) = self.sessions.get(call_id) else {
                    return;
                };
                if session.pipeline.teardown(call_id, &self.telephony) {
                    tracing::info!(%call_id, "utterance interrupted");
                } else {
                    tracing::debug!(%call_id, "interrupted with nothing playing");
                }
            }
            RemoteEvent::Closed { reason } => {
                if self.end_session(call_id, true).is_some() {
                    tracing::info!(
                        %call_id,
                        reason = reason.as_deref().unwrap_or("closed"),
                        "remote channel closed, call ended"
                    );
                }
            }
            RemoteEvent::Other => {}
        }
    }

    fn on_audio(&mut self, call_id: &CallId, chunk: Bytes) {
        let Some(session) = self.sessions.get_mut(call_id) else {
            tracing::trace!(%call_id, "audio for unknown call");
            return;
        };

        if !session.pipeline.is_active() {
            let mut pipeline = match self.pipelines.start(call_id) {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    tracing::warn!(%call_id, error = %e, "failed to start pipeline, dropping audio");
                    return;
                }
            };

            let playback = pipeline.playback().clone();
            let media = pipeline.media_ref();
            pipeline.track_play(request_playback(
                Arc::clone(&self.telephony),
                self.events.clone(),
                call_id.clone(),
                media,
                playback.clone(),
            ));

            if let Err(pipeline) = session.pipeline.install(pipeline) {
                pipeline.release(call_id, Arc::clone(&self.telephony));
                return;
            }
            session.utterances += 1;
            tracing::info!(%call_id, %playback, "pipeline started");
        }

        if !session.pipeline.write(call_id, chunk) {
            tracing::debug!(%call_id, "audio chunk dropped");
        }
    }

    fn on_playback_finished(&self, playback: &PlaybackId) {
        let Some(session) = self.sessions.find_by_playback(playback) else {
            tracing::debug!(%playback, "completion for a playback no longer active");
            return;
        };

        if session
            .pipeline
            .teardown_if(&session.call_id, playback, &self.telephony)
        {
            tracing::info!(call_id = %session.call_id, %playback, "utterance finished");
        }
    }

    /// Remove a session and release everything it holds
    ///
    /// Returns the telephony cleanup task, or `None` if the call was unknown.
    fn end_session(&mut self, call_id: &CallId, hangup_call: bool) -> Option<JoinHandle<()>> {
        let mut session = self.sessions.remove(call_id)?;

        self.routes.remove_call(call_id);
        if let Some(mut remote) = session.remote.take() {
            remote.close();
        }
        session.pipeline.teardown(call_id, &self.telephony);

        Some(release_media(
            Arc::clone(&self.telephony),
            call_id.clone(),
            session.media.take(),
            session.bridge.take(),
            hangup_call,
        ))
    }
}

async fn open_call(
    telephony: &dyn Telephony,
    connector: &dyn RemoteConnector,
    call_id: &CallId,
) -> Result<RemoteChannel> {
    telephony.answer(call_id).await?;
    connector.connect(call_id).await
}

async fn forward_remote(
    call_id: CallId,
    mut inbound: mpsc::Receiver<RemoteEvent>,
    events: mpsc::Sender<Event>,
) {
    while let Some(event) = inbound.recv().await {
        let event = Event::Remote {
            call_id: call_id.clone(),
            event,
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

/// Issue the play request in the background
///
/// The returned receiver fires once the request has been answered.
fn request_playback(
    telephony: Arc<dyn Telephony>,
    events: mpsc::Sender<Event>,
    call_id: CallId,
    media: String,
    playback: PlaybackId,
) -> oneshot::Receiver<()> {
    let (settled_tx, settled_rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = telephony.play(&call_id, &media, &playback).await;
        let _ = settled_tx.send(());
        if let Err(e) = result {
            let _ = events
                .send(Event::PlaybackFailed {
                    call_id,
                    playback,
                    error: e.to_string(),
                })
                .await;
        }
    });
    settled_rx
}

fn release_media(
    telephony: Arc<dyn Telephony>,
    call_id: CallId,
    target: Option<MediaTarget>,
    bridge: Option<BridgeHandle>,
    hangup_call: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(bridge) = bridge
            && let Err(e) = telephony.destroy_bridge(&bridge).await
        {
            tracing::warn!(%call_id, error = %e, "failed to destroy bridge");
        }
        if let Some(target) = target
            && let Err(e) = telephony.hangup(&target.channel_id).await
        {
            tracing::warn!(%call_id, error = %e, "failed to hang up media target");
        }
        if hangup_call && let Err(e) = telephony.hangup(call_id.as_str()).await {
            tracing::warn!(%call_id, error = %e, "failed to hang up call");
        }
    })
}
