//! Remote speech channel
//!
//! One WebSocket per call. Caller audio goes out as binary frames; inbound
//! text frames are classified by [`protocol::classify`] and handed to the
//! session orchestrator as [`RemoteEvent`]s.

mod protocol;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

pub use protocol::{RemoteEvent, classify};

use crate::telephony::CallId;
use crate::{Error, Result};

/// Caller audio chunks buffered toward the remote endpoint
const OUTBOUND_CAPACITY: usize = 256;

/// Inbound events buffered toward the orchestrator
const INBOUND_CAPACITY: usize = 256;

/// An open remote channel for one call
///
/// Dropping the channel closes it.
#[derive(Debug)]
pub struct RemoteChannel {
    outbound: mpsc::Sender<Bytes>,
    inbound: Option<mpsc::Receiver<RemoteEvent>>,
    closer: Option<oneshot::Sender<()>>,
}

impl RemoteChannel {
    /// Assemble a channel from its parts
    ///
    /// `closer` fires when the relay closes the channel.
    #[must_use]
    pub fn new(
        outbound: mpsc::Sender<Bytes>,
        inbound: mpsc::Receiver<RemoteEvent>,
        closer: oneshot::Sender<()>,
    ) -> Self {
        Self {
            outbound,
            inbound: Some(inbound),
            closer: Some(closer),
        }
    }

    /// Sender for raw caller audio
    #[must_use]
    pub fn outbound(&self) -> mpsc::Sender<Bytes> {
        self.outbound.clone()
    }

    /// Take the inbound event stream; only the first call returns it
    pub fn take_inbound(&mut self) -> Option<mpsc::Receiver<RemoteEvent>> {
        self.inbound.take()
    }

    /// Close the channel; later calls do nothing
    pub fn close(&mut self) {
        if let Some(closer) = self.closer.take() {
            let _ = closer.send(());
        }
    }
}

impl Drop for RemoteChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens remote channels
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Open a channel for a call
    async fn connect(&self, call: &CallId) -> Result<RemoteChannel>;
}

/// WebSocket connector for the speech endpoint
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl RemoteConnector for WsConnector {
    async fn connect(&self, call: &CallId) -> Result<RemoteChannel> {
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Remote(format!("connect to {} failed: {e}", self.url)))?;

        tracing::info!(call_id = %call, url = %self.url, "remote channel open");

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<RemoteEvent>(INBOUND_CAPACITY);
        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        let call = call.clone();

        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    _ = &mut close_rx => {
                        let _ = sink.send(Message::Close(None)).await;
                        break None;
                    }
                    Some(audio) = out_rx.recv() => {
                        if let Err(e) = sink.send(Message::Binary(audio)).await {
                            break Some(format!("send failed: {e}"));
                        }
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => match classify(text.as_str()) {
                            Ok(RemoteEvent::Other) => {}
                            Ok(event) => {
                                if in_tx.send(event).await.is_err() {
                                    break None;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(call_id = %call, error = %e, "ignoring remote frame");
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            break Some(format!("closed by remote: {frame:?}"));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Some(format!("receive failed: {e}")),
                        None => break Some("connection ended".to_string()),
                    },
                }
            };

            if let Some(reason) = &reason {
                tracing::warn!(call_id = %call, %reason, "remote channel lost");
            } else {
                tracing::debug!(call_id = %call, "remote channel closed");
            }
            let _ = in_tx.send(RemoteEvent::Closed { reason }).await;
        });

        Ok(RemoteChannel::new(out_tx, in_rx, close_tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_idempotent_and_signals_once() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let (_in_tx, in_rx) = mpsc::channel(1);
        let (close_tx, close_rx) = oneshot::channel();

        let mut channel = RemoteChannel::new(out_tx, in_rx, close_tx);
        assert!(channel.take_inbound().is_some());
        assert!(channel.take_inbound().is_none());

        channel.close();
        channel.close();
        assert!(close_rx.await.is_ok());
    }

    #[tokio::test]
    async fn dropping_closes() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let (_in_tx, in_rx) = mpsc::channel(1);
        let (close_tx, close_rx) = oneshot::channel();

        drop(RemoteChannel::new(out_tx, in_rx, close_tx));
        assert!(close_rx.await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_remote_error() {
        let connector = WsConnector::new(Url::parse("ws://127.0.0.1:1").unwrap());
        let result = connector.connect(&CallId::new("c1")).await;
        assert!(matches!(result, Err(Error::Remote(_))));
    }
}
