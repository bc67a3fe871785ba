//! Live status feed.
//!
//! Fan-out only: whenever a mutation changes an event's admission output,
//! the engine recomputes the full snapshot and publishes it here. The hub
//! holds no admission state of its own, so it can never diverge from what a
//! fresh calculator query would return. Each message is a complete snapshot,
//! not a delta; a lagged receiver just misses intermediate snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::admission::AdmissionRecord;

/// One full admission snapshot for an event.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionSnapshot {
    pub event_id: String,
    pub generated_at: i64,
    pub records: Vec<AdmissionRecord>,
}

/// Per-event broadcast channels for admission snapshots.
#[derive(Clone)]
pub struct FeedHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<AdmissionSnapshot>>>>,
    capacity: usize,
}

impl FeedHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Subscribe to an event's snapshots, creating the channel on first use.
    pub async fn subscribe(&self, event_id: &str) -> broadcast::Receiver<AdmissionSnapshot> {
        let mut channels = self.channels.write().await;
        channels
            .entry(event_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Push a snapshot to the event's subscribers. Returns the number of
    /// receivers it reached; an event nobody watches is a no-op.
    pub async fn publish(&self, snapshot: AdmissionSnapshot) -> usize {
        let channels = self.channels.read().await;
        let Some(sender) = channels.get(&snapshot.event_id) else {
            return 0;
        };

        match sender.send(snapshot) {
            Ok(receivers) => receivers,
            Err(_) => {
                // All receivers dropped since the channel was created
                0
            }
        }
    }

    /// Drop an event's channel (after the event itself is deleted).
    pub async fn forget(&self, event_id: &str) {
        let mut channels = self.channels.write().await;
        if channels.remove(event_id).is_some() {
            debug!(event_id = %event_id, "Dropped status feed channel");
        }
    }
}
