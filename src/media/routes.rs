//! Call association for the shared packet listener

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::telephony::CallId;

/// Outcome of forwarding one payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forward {
    /// Handed to the call's remote channel
    Delivered,
    /// No call is associated with the packet's source
    NoRoute,
    /// The call's channel is closed or backed up; payload dropped
    NotReady,
}

#[derive(Debug)]
struct Route {
    call_id: CallId,
    tx: mpsc::Sender<Bytes>,
}

/// Source address → remote channel mapping
///
/// Only the session orchestrator inserts and removes routes; the listener
/// only reads them.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Arc<RwLock<HashMap<SocketAddr, Route>>>,
}

impl RouteTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate packets from `source` with a call's outbound audio sender
    ///
    /// Replaces any previous association for that source.
    pub fn insert(&self, source: SocketAddr, call_id: CallId, tx: mpsc::Sender<Bytes>) {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = routes.insert(source, Route { call_id, tx })
            && let Some(current) = routes.get(&source)
            && previous.call_id != current.call_id
        {
            tracing::warn!(
                %source,
                previous = %previous.call_id,
                current = %current.call_id,
                "media source reassigned to another call"
            );
        }
    }

    /// Drop every association belonging to a call
    pub fn remove_call(&self, call_id: &CallId) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, route| &route.call_id != call_id);
    }

    /// Call associated with a source, if any
    #[must_use]
    pub fn call_for(&self, source: &SocketAddr) -> Option<CallId> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .map(|route| route.call_id.clone())
    }

    /// Forward a payload to the channel associated with `source`
    ///
    /// Never blocks and never buffers: a full or closed channel drops it.
    pub fn forward(&self, source: &SocketAddr, payload: Bytes) -> Forward {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let Some(route) = routes.get(source) else {
            return Forward::NoRoute;
        };

        match route.tx.try_send(payload) {
            Ok(()) => Forward::Delivered,
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => Forward::NotReady,
        }
    }

    /// Number of associated sources
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no source is associated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
