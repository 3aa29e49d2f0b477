use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::protocol::ServerFrame;

/// Live socket connections, keyed by connection id.
///
/// Each connection registers an unbounded sender; a writer task on the
/// socket side drains the matching receiver. Emitting to a vanished
/// connection is not an error here — callers that need to surface it
/// (skill forwarding) check liveness explicitly first.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<ServerFrame>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: &str, sender: mpsc::UnboundedSender<ServerFrame>) {
        self.inner.write().await.insert(id.to_string(), sender);
    }

    pub async fn remove(&self, id: &str) {
        self.inner.write().await.remove(id);
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.contains_key(id)
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Send a frame to one connection. Returns false if the connection is
    /// gone (unknown id or closed channel).
    pub async fn send_to(&self, id: &str, frame: ServerFrame) -> bool {
        let connections = self.inner.read().await;
        match connections.get(id) {
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        }
    }

    /// Send a frame to every live connection.
    pub async fn broadcast(&self, frame: ServerFrame) {
        let connections = self.inner.read().await;
        for (id, sender) in connections.iter() {
            if sender.send(frame.clone()).is_err() {
                debug!(connection_id = %id, "Skipping closed connection during broadcast");
            }
        }
    }
}
