//! ==============================================================================
//! hub.rs - live broadcast to connected viewers
//! ==============================================================================
//!
//! purpose:
//!     fans each newly ingested reading out to every open websocket.
//!     delivery is best-effort: no acks, no replay for late joiners, and a
//!     viewer that falls more than `capacity` frames behind skips ahead.
//!
//! relationships:
//!     - used by: server.rs (publish after append)
//!     - used by: channel.rs (one subscription per websocket)
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// one websocket frame, in both directions: `{"event": "...", "data": {...}}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl ChannelFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }
}

#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<ChannelFrame>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// deliver to every current viewer, returning how many were reached
    pub fn publish(&self, event: &str, data: Value) -> usize {
        // no receivers is not an error here, nobody is watching
        self.tx.send(ChannelFrame::new(event, data)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelFrame> {
        self.tx.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
