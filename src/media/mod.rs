//! Inbound call media
//!
//! Receives caller audio on the shared listener and routes it per call.

mod listener;
mod routes;

pub use listener::{PacketListener, RTP_HEADER_LEN, strip_header};
pub use routes::{Forward, RouteTable};
