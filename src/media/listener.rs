//! Packet ingestion listener
//!
//! One UDP socket receives media for every call. Each datagram carries a
//! fixed 12-byte RTP header followed by raw 16-bit linear PCM; the header is
//! stripped and the payload forwarded to the call's remote channel.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::UdpSocket;

use super::routes::{Forward, RouteTable};
use crate::{Error, Result};

/// Fixed transport header length
pub const RTP_HEADER_LEN: usize = 12;

/// Largest datagram the listener accepts
const MAX_DATAGRAM: usize = 2048;

/// Strip the transport header, returning `None` for packets without payload
#[must_use]
pub fn strip_header(packet: &[u8]) -> Option<&[u8]> {
    packet.get(RTP_HEADER_LEN..).filter(|payload| !payload.is_empty())
}

/// Shared media packet listener
pub struct PacketListener {
    socket: UdpSocket,
    routes: RouteTable,
}

impl PacketListener {
    /// Bind the listener
    ///
    /// # Errors
    ///
    /// Returns `Error::Listener` if the address cannot be bound
    pub async fn bind(addr: SocketAddr, routes: RouteTable) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::Listener(format!("failed to bind {addr}: {e}")))?;
        Ok(Self { socket, routes })
    }

    /// Address the listener is bound to
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive and forward packets until the task is cancelled
    ///
    /// # Errors
    ///
    /// Never returns under normal operation; per-packet failures are logged
    pub async fn run(self) -> Result<()> {
        tracing::info!(addr = ?self.socket.local_addr().ok(), "packet listener running");

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, source) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!(error = %e, "packet receive failed");
                    continue;
                }
            };

            let Some(payload) = strip_header(&buf[..len]) else {
                tracing::trace!(%source, len, "dropping packet without payload");
                continue;
            };

            match self.routes.forward(&source, Bytes::copy_from_slice(payload)) {
                Forward::Delivered => {}
                Forward::NoRoute => tracing::trace!(%source, "no call for media source"),
                Forward::NotReady => tracing::trace!(%source, "remote channel not ready"),
            }
        }
    }
}
