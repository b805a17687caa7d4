//! Live visit notifications for connected dashboards
//!
//! [`LiveBroadcaster`] owns the set of open dashboard connections. Each
//! connection holds a [`Subscription`] whose drop removes it from the set, so
//! registration follows the connection's lifetime. Delivery is best-effort
//! and at-most-once: a connection whose queue is full or closed is skipped.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Queued messages per connection before sends to it are skipped
const CONNECTION_BUFFER: usize = 64;

/// Server-to-dashboard push event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    NewVisit { ip: String, timestamp: String },
}

#[derive(Default)]
pub struct LiveBroadcaster {
    connections: Arc<DashMap<u64, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

/// One registered dashboard connection
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<String>,
    connections: Arc<DashMap<u64, mpsc::Sender<String>>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next serialized event
    ///
    /// The registry keeps this connection's sender alive until the
    /// subscription itself is dropped, so this waits rather than ending.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.connections.remove(&self.id);
        debug!(connection = self.id, "live connection closed");
    }
}

impl LiveBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(CONNECTION_BUFFER);
        self.connections.insert(id, sender);
        debug!(connection = id, "live connection opened");

        Subscription {
            id,
            receiver,
            connections: Arc::clone(&self.connections),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Send an event to every ready connection; returns how many accepted it
    pub fn notify(&self, event: &LiveEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "failed to serialize live event");
                return 0;
            }
        };

        let mut delivered = 0;
        for entry in self.connections.iter() {
            match entry.value().try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(connection = *entry.key(), error = %e, "skipping live connection"),
            }
        }
        delivered
    }
}
