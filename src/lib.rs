//! Call Relay - bridges live telephony calls to a realtime speech endpoint
//!
//! Caller audio arriving from the telephony layer is forwarded to a remote
//! speech endpoint over a per-call WebSocket; synthesized response audio is
//! resampled and played back into the same call, with support for
//! mid-utterance interruption.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  RTP/UDP   ┌──────────────────┐  binary   ┌─────────────────┐
//! │   Telephony   │──────────▶│ Packet listener  │─────────▶│                 │
//! │   (Asterisk)  │            └──────────────────┘           │ Speech endpoint │
//! │               │  play FIFO ┌──────────────────┐  base64   │   (WebSocket)   │
//! │               │◀──────────│ Resample pipeline│◀─────────│                 │
//! └───────┬───────┘            └──────────────────┘           └─────────────────┘
//!         │ ARI events / REST            ▲
//!         ▼                              │
//! ┌──────────────────────────────────────┴─────────────────────────────────────┐
//! │                          Session orchestrator                              │
//! └────────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod remote;
pub mod session;
pub mod telephony;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
