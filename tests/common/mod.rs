//! Shared test utilities
//!
//! Mock collaborators that record every operation in one ordered journal.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use callrelay::pipeline::{FilterLauncher, FilterProcess, PipelineFactory};
use callrelay::remote::{RemoteChannel, RemoteConnector, RemoteEvent};
use callrelay::session::{Event, MediaSettings, Orchestrator};
use callrelay::media::RouteTable;
use callrelay::telephony::{
    BridgeHandle, CallId, MediaTarget, MediaTargetParams, PlaybackId, Telephony, TelephonyEvent,
};
use callrelay::{Error, Result};
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};

/// One recorded collaborator operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Answer(String),
    Hangup(String),
    CreateMedia(String),
    Bridge(String),
    DestroyBridge(String),
    Play {
        call: String,
        media: String,
        playback: String,
    },
    StopPlayback(String),
    Launch {
        call: String,
        fifo_ready: bool,
    },
    Write {
        call: String,
        bytes: Vec<u8>,
    },
    Kill(String),
}

/// Ordered record of operations across all mocks
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Op>>>);

impl Journal {
    pub fn push(&self, op: Op) {
        self.0.lock().unwrap().push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Op) -> bool) -> usize {
        self.ops().iter().filter(|op| pred(op)).count()
    }

    pub fn position(&self, pred: impl Fn(&Op) -> bool) -> Option<usize> {
        self.ops().iter().position(pred)
    }

    /// Playback ids in the order they were requested
    pub fn playbacks(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Play { playback, .. } => Some(playback),
                _ => None,
            })
            .collect()
    }

    pub fn kills(&self) -> usize {
        self.count(|op| matches!(op, Op::Kill(_)))
    }

    pub fn launches(&self) -> usize {
        self.count(|op| matches!(op, Op::Launch { .. }))
    }

    /// Playback ids stopped, in order
    pub fn stopped(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::StopPlayback(playback) => Some(playback),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> usize {
        self.count(|op| matches!(op, Op::StopPlayback(_)))
    }
}

/// Mock telephony layer
pub struct MockTelephony {
    journal: Journal,
    next_port: AtomicU16,
    pub fail_play: AtomicBool,
    pub fail_answer: AtomicBool,
    pub playback_gone: AtomicBool,
    /// Milliseconds each play request takes to be accepted
    pub play_delay_ms: AtomicU64,
}

impl MockTelephony {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            next_port: AtomicU16::new(40_000),
            fail_play: AtomicBool::new(false),
            fail_answer: AtomicBool::new(false),
            playback_gone: AtomicBool::new(false),
            play_delay_ms: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Telephony for MockTelephony {
    async fn answer(&self, call: &CallId) -> Result<()> {
        if self.fail_answer.load(Ordering::SeqCst) {
            return Err(Error::Telephony("answer rejected".into()));
        }
        self.journal.push(Op::Answer(call.to_string()));
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> Result<()> {
        self.journal.push(Op::Hangup(channel_id.to_string()));
        Ok(())
    }

    async fn create_media_target(&self, params: &MediaTargetParams) -> Result<MediaTarget> {
        self.journal.push(Op::CreateMedia(params.channel_id.clone()));
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        Ok(MediaTarget {
            channel_id: params.channel_id.clone(),
            source: Some(SocketAddr::from(([127, 0, 0, 1], port))),
        })
    }

    async fn bridge(&self, call: &CallId, _target: &MediaTarget) -> Result<BridgeHandle> {
        self.journal.push(Op::Bridge(call.to_string()));
        Ok(BridgeHandle {
            bridge_id: format!("bridge-{call}"),
        })
    }

    async fn destroy_bridge(&self, bridge: &BridgeHandle) -> Result<()> {
        self.journal.push(Op::DestroyBridge(bridge.bridge_id.clone()));
        Ok(())
    }

    async fn play(&self, call: &CallId, media: &str, playback: &PlaybackId) -> Result<()> {
        let delay = self.play_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(Error::Telephony("play rejected".into()));
        }
        self.journal.push(Op::Play {
            call: call.to_string(),
            media: media.to_string(),
            playback: playback.to_string(),
        });
        Ok(())
    }

    async fn stop_playback(&self, playback: &PlaybackId) -> Result<()> {
        self.journal.push(Op::StopPlayback(playback.to_string()));
        if self.playback_gone.load(Ordering::SeqCst) {
            return Err(Error::PlaybackNotFound(playback.to_string()));
        }
        Ok(())
    }
}

/// Mock filter launcher
pub struct MockLauncher {
    journal: Journal,
    pub fail: AtomicBool,
}

impl MockLauncher {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail: AtomicBool::new(false),
        }
    }
}

impl FilterLauncher for MockLauncher {
    fn launch(&self, call: &CallId, output: &Path) -> Result<Box<dyn FilterProcess>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Pipeline("launch failed".into()));
        }
        let fifo_ready = std::fs::metadata(output).is_ok_and(|m| m.file_type().is_fifo());
        self.journal.push(Op::Launch {
            call: call.to_string(),
            fifo_ready,
        });
        Ok(Box::new(MockProcess {
            call: call.to_string(),
            journal: self.journal.clone(),
            killed: false,
        }))
    }
}

struct MockProcess {
    call: String,
    journal: Journal,
    killed: bool,
}

impl FilterProcess for MockProcess {
    fn write(&mut self, chunk: Bytes) -> Result<()> {
        if self.killed {
            return Err(Error::Pipeline("write after kill".into()));
        }
        self.journal.push(Op::Write {
            call: self.call.clone(),
            bytes: chunk.to_vec(),
        });
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Err(Error::Pipeline("already killed".into()));
        }
        self.killed = true;
        self.journal.push(Op::Kill(self.call.clone()));
        Ok(())
    }
}

/// Test side of a mock remote channel
pub struct RemoteHandle {
    /// Feeds events to the relay as if they came from the endpoint
    pub inbound: mpsc::Sender<RemoteEvent>,
    /// Caller audio the relay sent to the endpoint
    pub outbound: mpsc::Receiver<Bytes>,
    /// Fires when the relay closes the channel
    pub closed: oneshot::Receiver<()>,
}

/// Mock remote connector
#[derive(Default)]
pub struct MockConnector {
    handles: Mutex<HashMap<CallId, RemoteHandle>>,
    pub fail: AtomicBool,
}

impl MockConnector {
    pub fn take(&self, call: &str) -> RemoteHandle {
        self.handles
            .lock()
            .unwrap()
            .remove(&CallId::new(call))
            .expect("no remote channel opened for call")
    }
}

#[async_trait]
impl RemoteConnector for MockConnector {
    async fn connect(&self, call: &CallId) -> Result<RemoteChannel> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Remote("connection refused".into()));
        }
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let (close_tx, close_rx) = oneshot::channel();
        self.handles.lock().unwrap().insert(
            call.clone(),
            RemoteHandle {
                inbound: in_tx,
                outbound: out_rx,
                closed: close_rx,
            },
        );
        Ok(RemoteChannel::new(out_tx, in_rx, close_tx))
    }
}

/// An orchestrator wired to mocks
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub events: mpsc::Receiver<Event>,
    pub journal: Journal,
    pub telephony: Arc<MockTelephony>,
    pub launcher: Arc<MockLauncher>,
    pub connector: Arc<MockConnector>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let journal = Journal::default();
        let telephony = Arc::new(MockTelephony::new(journal.clone()));
        let launcher = Arc::new(MockLauncher::new(journal.clone()));
        let connector = Arc::new(MockConnector::default());
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        let pipelines = PipelineFactory::new(dir.path(), launcher.clone());
        let media = MediaSettings {
            app: "voicebot_app".to_string(),
            external_host: SocketAddr::from(([127, 0, 0, 1], 10_000)),
            format: "slin16".to_string(),
        };
        let (orchestrator, events) = Orchestrator::new(
            telephony.clone(),
            connector.clone(),
            pipelines,
            media,
            RouteTable::new(),
        );

        Self {
            orchestrator,
            events,
            journal,
            telephony,
            launcher,
            connector,
            dir,
        }
    }

    /// Process queued events until the queue stays idle
    pub async fn settle(&mut self) {
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), self.events.recv()).await
        {
            self.orchestrator.handle(event);
        }
    }

    /// Start a call and wait until it is answered and bridged
    pub async fn start_call(&mut self, call: &str) -> RemoteHandle {
        self.orchestrator
            .handle(Event::Telephony(TelephonyEvent::CallStart {
                call_id: CallId::new(call),
                caller: Some("+15550100".to_string()),
            }));
        self.settle().await;
        self.connector.take(call)
    }

    /// Deliver a remote event for a call
    pub fn remote(&mut self, call: &str, event: RemoteEvent) {
        self.orchestrator.handle(Event::Remote {
            call_id: CallId::new(call),
            event,
        });
    }

    /// Deliver a response audio chunk for a call
    pub fn audio(&mut self, call: &str, bytes: &'static [u8]) {
        self.remote(call, RemoteEvent::Audio(Bytes::from_static(bytes)));
    }

    pub fn stream_path(&self, call: &str) -> std::path::PathBuf {
        callrelay::pipeline::fifo::stream_path(self.dir.path(), &CallId::new(call))
    }

    pub fn pipeline_active(&self, call: &str) -> bool {
        self.orchestrator
            .sessions()
            .get(&CallId::new(call))
            .is_some_and(|s| s.pipeline.is_active())
    }
}
