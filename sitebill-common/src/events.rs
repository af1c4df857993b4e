//! Progress event types and per-session progress bus
//!
//! Parsing and materialization report progress through a publish/subscribe
//! channel keyed by a caller-supplied session identifier. Delivery is
//! best-effort: a late subscriber misses earlier events, and the absence of
//! any subscriber is not an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Progress events for one upload session
///
/// Serialized for SSE transmission. No further events follow a
/// `Complete` or `Error` event on the same session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Periodic progress update during parsing
    Progress {
        /// Rows processed so far
        current: usize,
        /// Total rows discovered (0 while unknown)
        total: usize,
        /// Human-readable description of the current operation
        message: String,
    },
    /// Terminal: operation finished, payload carries the final result
    Complete { payload: serde_json::Value },
    /// Terminal: operation failed
    Error { message: String },
}

impl ProgressEvent {
    /// Event type string for SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    /// Terminal events end the session's channel
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. }
        )
    }
}

/// Per-session broadcast channels, created on first subscribe and
/// dropped after the terminal event
#[derive(Clone)]
pub struct ProgressBus {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<ProgressEvent>>>>,
    capacity: usize,
}

impl ProgressBus {
    /// Create a new bus; `capacity` bounds the per-session event buffer
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Subscribe to a session's events, creating the channel if absent
    pub async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish an event to a session's channel
    ///
    /// Returns the number of receivers the event reached. A terminal event
    /// removes the channel so the session id can be reused. Publishing
    /// never creates a channel: without one the event is dropped, so a
    /// straggling progress event arriving after the terminal event cannot
    /// resurrect a dead session entry.
    pub async fn publish(&self, session_id: &str, event: ProgressEvent) -> usize {
        let terminal = event.is_terminal();
        let mut channels = self.channels.write().await;
        let Some(tx) = channels.get(session_id) else {
            debug!(session_id, "progress event had no live channel");
            return 0;
        };

        let reached = match tx.send(event) {
            Ok(receiver_count) => receiver_count,
            Err(_) => {
                // No receivers - this is fine, just log at debug level
                debug!(session_id, "progress event had no receivers");
                0
            }
        };

        if terminal {
            channels.remove(session_id);
        }
        reached
    }

    /// Number of live session channels (for diagnostics)
    pub async fn session_count(&self) -> usize {
        self.channels.read().await.len()
    }
}
