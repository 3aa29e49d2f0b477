//! Test doubles for the gateway core.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::GatewayError;
use crate::protocol::{UpstreamEnvelope, UpstreamReply};
use crate::upstream::{UpstreamConnection, UpstreamTransport};

/// Scriptable [`UpstreamTransport`]: records every envelope the manager
/// sends, lets tests inject replies, refuse or hold connect attempts,
/// and kill the live connection.
pub struct MockTransport {
    sent: Arc<Mutex<Vec<UpstreamEnvelope>>>,
    refuse: AtomicUsize,
    connects: AtomicUsize,
    gate_tx: watch::Sender<bool>,
    // Keep a live receiver so `gate_tx.send` always has a subscriber and
    // retains the value; otherwise `send` errors and drops the update
    // whenever no connect is currently parked on the gate.
    _gate_rx: watch::Receiver<bool>,
    current: tokio::sync::Mutex<Option<mpsc::UnboundedSender<UpstreamReply>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (gate_tx, gate_rx) = watch::channel(false);
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            refuse: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            gate_tx,
            _gate_rx: gate_rx,
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// Make the next `n` connect attempts fail.
    pub fn refuse_next_connects(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Park connect attempts until [`release_connects`](Self::release_connects).
    pub fn hold_connects(&self) {
        let _ = self.gate_tx.send(true);
    }

    pub fn release_connects(&self) {
        let _ = self.gate_tx.send(false);
    }

    /// Number of connect attempts observed (successful or refused).
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<UpstreamEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Inject a reply for a request id. Returns false if no connection is
    /// live.
    pub async fn reply(&self, request_id: &str, text: &str) -> bool {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(tx) => tx
                .send(UpstreamReply {
                    request_id: request_id.to_string(),
                    text: Some(text.to_string()),
                    message: None,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Kill the live connection; the manager sees the inbound side end.
    pub async fn drop_connection(&self) {
        self.current.lock().await.take();
    }
}

#[async_trait]
impl UpstreamTransport for MockTransport {
    async fn connect(
        &self,
        _url: &str,
        _token: &str,
    ) -> Result<UpstreamConnection, GatewayError> {
        let mut gate_rx = self.gate_tx.subscribe();
        while *gate_rx.borrow() {
            if gate_rx.changed().await.is_err() {
                break;
            }
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(GatewayError::ConnectFailed("refused by mock".to_string()));
        }

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<UpstreamEnvelope>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<UpstreamReply>();
        *self.current.lock().await = Some(inbound_tx);

        let sent = self.sent.clone();
        tokio::spawn(async move {
            while let Some(envelope) = outbound_rx.recv().await {
                sent.lock().unwrap().push(envelope);
            }
        });

        Ok(UpstreamConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_sent_envelopes() {
        let transport = MockTransport::new();
        let connection = transport.connect("ws://x", "t").await.unwrap();

        connection
            .outbound
            .send(UpstreamEnvelope {
                request_id: "r1".to_string(),
                text: "hello".to_string(),
                timestamp: chrono::Utc::now(),
            })
            .unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        while transport.sent_count() < 1 {
            assert!(tokio::time::Instant::now() < deadline, "envelope not recorded");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(transport.sent()[0].text, "hello");
    }

    #[tokio::test]
    async fn test_mock_refuses_then_accepts() {
        let transport = MockTransport::new();
        transport.refuse_next_connects(1);

        assert!(transport.connect("ws://x", "t").await.is_err());
        assert!(transport.connect("ws://x", "t").await.is_ok());
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_reply_reaches_inbound() {
        let transport = MockTransport::new();
        let mut connection = transport.connect("ws://x", "t").await.unwrap();

        assert!(transport.reply("r1", "pong").await);
        let reply = connection.inbound.recv().await.unwrap();
        assert_eq!(reply.request_id, "r1");
        assert_eq!(reply.body(), "pong");
    }

    #[tokio::test]
    async fn test_mock_drop_connection_ends_inbound() {
        let transport = MockTransport::new();
        let mut connection = transport.connect("ws://x", "t").await.unwrap();

        transport.drop_connection().await;
        assert!(connection.inbound.recv().await.is_none());
        assert!(!transport.reply("r1", "pong").await);
    }
}
