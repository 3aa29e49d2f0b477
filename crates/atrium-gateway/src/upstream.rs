use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use atrium_commands::{CommandInterpreter, CommandReply};
use atrium_store::{ChatMessage, ChatRole, Store};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::protocol::{UpstreamEnvelope, UpstreamReply};

const RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// State of the single logical connection to the upstream agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Uninitialized,
    Connecting,
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Uninitialized => write!(f, "uninitialized"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A live bidirectional link to the upstream agent: a sink for outbound
/// envelopes and a stream of correlated replies. The link is considered
/// closed when the inbound side ends.
pub struct UpstreamConnection {
    pub outbound: mpsc::UnboundedSender<UpstreamEnvelope>,
    pub inbound: mpsc::UnboundedReceiver<UpstreamReply>,
}

/// Transport seam so tests can substitute a scripted upstream and a
/// future deployment could hold one transport per tenant.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn connect(&self, url: &str, token: &str)
        -> Result<UpstreamConnection, GatewayError>;
}

/// Production transport: a WebSocket client with bearer-token auth.
#[derive(Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UpstreamTransport for WsTransport {
    async fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> Result<UpstreamConnection, GatewayError> {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;
        use tokio_tungstenite::tungstenite::Message;

        let mut request = url
            .into_client_request()
            .map_err(|e| GatewayError::ConnectFailed(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {token}")
                .parse()
                .map_err(|_| GatewayError::ConnectFailed("invalid token header".to_string()))?,
        );

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| GatewayError::ConnectFailed(e.to_string()))?;
        let (mut sink, mut stream) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<UpstreamEnvelope>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<UpstreamReply>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_envelope = outbound_rx.recv() => {
                        let Some(envelope) = maybe_envelope else { break };
                        let json = match serde_json::to_string(&envelope) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "Failed to serialize upstream envelope");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    maybe_msg = stream.next() => {
                        match maybe_msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<UpstreamReply>(&text) {
                                    Ok(reply) => {
                                        if inbound_tx.send(reply).is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => warn!(error = %e, "Failed to parse upstream frame"),
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                if sink.send(Message::Pong(payload)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                info!("Upstream closed the connection");
                                break;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "Upstream socket error");
                                break;
                            }
                            _ => {}
                        }
                    }
                }
            }
            // inbound_tx drops here; the manager sees the link as closed
        });

        Ok(UpstreamConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

struct QueuedMessage {
    envelope: UpstreamEnvelope,
    queued_at: DateTime<Utc>,
}

struct ConnState {
    status: ConnectionStatus,
    outbound: Option<mpsc::UnboundedSender<UpstreamEnvelope>>,
    queue: VecDeque<QueuedMessage>,
}

/// A chat message entering the core, from HTTP or a socket event.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub text: String,
    pub persist: bool,
}

/// How a chat message resolved.
#[derive(Debug)]
pub enum ChatOutcome {
    /// A local slash-command answered it; no network round trip happened.
    Command(CommandReply),
    /// The upstream agent replied. `message` is the persisted record of
    /// the reply, when the store accepted it.
    Sent {
        text: String,
        message: Option<ChatMessage>,
    },
}

/// Owns the single outbound connection to the upstream agent and brokers
/// request/response correlation over it.
///
/// Cheap to clone; all state is shared. Mutation happens under the state
/// and pending locks, so the uniqueness of the connect task and the
/// reply-vs-timeout race are both decided by who takes the lock first.
#[derive(Clone)]
pub struct GatewayManager {
    config: GatewayConfig,
    store: Arc<dyn Store>,
    interpreter: Arc<CommandInterpreter>,
    transport: Arc<dyn UpstreamTransport>,
    state: Arc<Mutex<ConnState>>,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<UpstreamReply>>>>,
    request_timeout: Duration,
    queue_capacity: usize,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl GatewayManager {
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn Store>,
        interpreter: Arc<CommandInterpreter>,
        transport: Arc<dyn UpstreamTransport>,
    ) -> Self {
        Self {
            config,
            store,
            interpreter,
            transport,
            state: Arc::new(Mutex::new(ConnState {
                status: ConnectionStatus::Uninitialized,
                outbound: None,
                queue: VecDeque::new(),
            })),
            pending: Arc::new(Mutex::new(HashMap::new())),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reconnect_attempts: RECONNECT_ATTEMPTS,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self
    }

    /// Explicitly start connecting. No-op if a connection attempt is
    /// already in flight or established.
    pub async fn init(&self) -> Result<(), GatewayError> {
        if !self.config.is_configured() {
            return Err(GatewayError::NotConfigured);
        }
        let mut state = self.state.lock().await;
        self.spawn_connect_if_idle(&mut state);
        Ok(())
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.lock().await.status
    }

    pub async fn queued_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// The externally visible entry point: resolve a chat message to a
    /// reply, or fail with a terminal / per-request error.
    pub async fn process_message(
        &self,
        incoming: IncomingMessage,
    ) -> Result<ChatOutcome, GatewayError> {
        let text = incoming.text.trim().to_string();

        if incoming.persist {
            self.persist_turn(ChatRole::User, &text).await;
        }

        // Local slash-commands short-circuit before any network concern.
        if let Some(reply) = self.interpreter.interpret(&text).await {
            self.persist_turn(ChatRole::Assistant, &reply.text).await;
            return Ok(ChatOutcome::Command(reply));
        }

        // Missing configuration is terminal, not a transient disconnect:
        // fail fast with no queueing and no retry.
        if !self.config.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let envelope = UpstreamEnvelope {
            request_id: request_id.clone(),
            text: text.clone(),
            timestamp: Utc::now(),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(request_id.clone(), reply_tx);

        {
            let mut state = self.state.lock().await;
            let sent_now = state.status == ConnectionStatus::Connected
                && state
                    .outbound
                    .as_ref()
                    .is_some_and(|outbound| outbound.send(envelope.clone()).is_ok());

            if !sent_now {
                if state.queue.len() >= self.queue_capacity {
                    if let Some(dropped) = state.queue.pop_front() {
                        // Drop-oldest: the evicted request resolves via
                        // its own timeout.
                        warn!(
                            request_id = %dropped.envelope.request_id,
                            "Message queue full; dropping oldest"
                        );
                    }
                }
                state.queue.push_back(QueuedMessage {
                    envelope,
                    queued_at: Utc::now(),
                });
                debug!(request_id = %request_id, "Upstream not connected; message queued");
                self.spawn_connect_if_idle(&mut state);
            }
        }

        match timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(reply)) => {
                let body = reply.body().to_string();
                let message = self.persist_turn(ChatRole::Assistant, &body).await;
                Ok(ChatOutcome::Sent {
                    text: body,
                    message,
                })
            }
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&request_id);
                Err(GatewayError::SendFailed("reply channel closed".to_string()))
            }
            Err(_) => {
                // Removing the pending entry is what makes a late reply a
                // silent no-op.
                self.pending.lock().await.remove(&request_id);
                debug!(request_id = %request_id, "Request timed out");
                Err(GatewayError::Timeout)
            }
        }
    }

    async fn persist_turn(&self, role: ChatRole, content: &str) -> Option<ChatMessage> {
        match self.store.create_chat_message(role, content).await {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "Failed to persist chat turn");
                None
            }
        }
    }

    /// Spawn the connect loop unless one is already in flight. Every
    /// spawn site flips the status to Connecting under the state lock
    /// first, so at most one loop exists at a time.
    fn spawn_connect_if_idle(&self, state: &mut ConnState) {
        if matches!(
            state.status,
            ConnectionStatus::Uninitialized | ConnectionStatus::Disconnected
        ) {
            state.status = ConnectionStatus::Connecting;
            self.clone().spawn_connect_loop();
        }
    }

    /// Spawn `connect_loop` through a type-erased future. The boxed
    /// `dyn Future + Send` breaks the opaque-type Send-inference cycle
    /// between `connect_loop`, `install_connection`, and
    /// `handle_disconnect` that would otherwise reject the spawn.
    fn spawn_connect_loop(self) {
        let fut: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(self.connect_loop());
        tokio::spawn(fut);
    }

    async fn connect_loop(self) {
        let (Some(url), Some(token)) = (self.config.url.clone(), self.config.token.clone())
        else {
            self.state.lock().await.status = ConnectionStatus::Disconnected;
            return;
        };

        for attempt in 1..=self.reconnect_attempts {
            match self.transport.connect(&url, &token).await {
                Ok(connection) => {
                    if self.install_connection(connection).await {
                        return;
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Upstream connect attempt failed");
                }
            }
            if attempt < self.reconnect_attempts {
                tokio::time::sleep(self.reconnect_delay).await;
            }
        }

        let mut state = self.state.lock().await;
        state.status = ConnectionStatus::Disconnected;
        state.outbound = None;
        warn!("Upstream connect attempts exhausted; will retry on next send");
    }

    async fn install_connection(&self, connection: UpstreamConnection) -> bool {
        let UpstreamConnection {
            outbound,
            mut inbound,
        } = connection;

        let mut state = self.state.lock().await;

        // Flush the backlog while holding the state lock: anything
        // submitted after this connect completes must order behind every
        // queued message.
        while let Some(queued) = state.queue.pop_front() {
            let QueuedMessage { envelope, queued_at } = queued;
            let request_id = envelope.request_id.clone();
            if let Err(failed) = outbound.send(envelope) {
                warn!(request_id = %request_id, "Connection dropped during queue flush");
                state.queue.push_front(QueuedMessage {
                    envelope: failed.0,
                    queued_at,
                });
                state.status = ConnectionStatus::Disconnected;
                return false;
            }
            debug!(request_id = %request_id, "Flushed queued message");
        }

        state.outbound = Some(outbound);
        state.status = ConnectionStatus::Connected;
        drop(state);
        info!("Connected to upstream gateway");

        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(reply) = inbound.recv().await {
                manager.deliver(reply).await;
            }
            manager.handle_disconnect().await;
        });
        true
    }

    async fn handle_disconnect(&self) {
        let mut state = self.state.lock().await;
        if state.status == ConnectionStatus::Connected {
            state.status = ConnectionStatus::Connecting;
            state.outbound = None;
            info!("Upstream connection lost; reconnecting");
            self.clone().spawn_connect_loop();
        }
    }

    /// Match a reply to its pending request. Replies for ids that have
    /// already resolved or timed out are dropped silently.
    async fn deliver(&self, reply: UpstreamReply) {
        let sender = self.pending.lock().await.remove(&reply.request_id);
        match sender {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => {
                debug!(request_id = %reply.request_id, "Dropping reply with no pending request");
            }
        }
    }
}
