use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use atrium_skills::{InvocationOutcome, SkillDirectory};

use crate::connections::ConnectionRegistry;
use crate::error::GatewayError;
use crate::protocol::{body_object, ClientFrame, ServerFrame};
use crate::upstream::{ChatOutcome, GatewayManager, IncomingMessage};

struct AppState {
    manager: GatewayManager,
    skills: Arc<SkillDirectory>,
    connections: ConnectionRegistry,
    start_time: Instant,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    upstream: String,
    version: &'static str,
}

/// The inbound-facing socket server: one multiplexed event channel for
/// browser clients and skill-providing bots.
pub struct GatewayServer {
    manager: GatewayManager,
    skills: Arc<SkillDirectory>,
    connections: ConnectionRegistry,
}

impl GatewayServer {
    pub fn new(manager: GatewayManager, skills: Arc<SkillDirectory>) -> Self {
        Self {
            manager,
            skills,
            connections: ConnectionRegistry::new(),
        }
    }

    pub fn connections(&self) -> ConnectionRegistry {
        self.connections.clone()
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            manager: self.manager.clone(),
            skills: self.skills.clone(),
            connections: self.connections.clone(),
            start_time: Instant::now(),
        });
        Router::new()
            .route("/ws", axum::routing::any(ws_handler))
            .route("/health", axum::routing::get(health_handler))
            .with_state(state)
    }

    pub async fn start(&self, host: &str, port: u16) -> Result<(), GatewayError> {
        let app = self.router();
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))?;

        info!("Gateway listening on ws://{}/ws", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))?;

        Ok(())
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.connections.count().await,
        upstream: state.manager.status().await.to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<ServerFrame>();
    state.connections.insert(&connection_id, frame_tx.clone()).await;
    info!(connection_id = %connection_id, "Socket client connected");

    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize server frame");
                    continue;
                }
            };
            if sink.send(Message::text(json)).await.is_err() {
                break;
            }
        }
    });

    let status = state.manager.status().await;
    let _ = frame_tx.send(ServerFrame::GatewayStatus {
        status: status.to_string(),
    });

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => handle_frame(frame, &connection_id, &state, &frame_tx).await,
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "Unparseable client frame");
                let _ = frame_tx.send(ServerFrame::ChatError {
                    status_code: 400,
                    error: format!("Invalid frame: {e}"),
                    text: "Could not parse that message.".to_string(),
                });
            }
        }
    }

    state.connections.remove(&connection_id).await;
    writer.abort();

    // Disconnect cleanup: drop the connection's skills and tell everyone
    // still here what disappeared.
    let removed = state.skills.remove_by_connection(&connection_id).await;
    if removed > 0 {
        state
            .connections
            .broadcast(ServerFrame::SkillUnregistered {
                socket_id: connection_id.clone(),
                count: removed,
            })
            .await;
    }
    info!(connection_id = %connection_id, "Socket client disconnected");
}

async fn handle_frame(
    frame: ClientFrame,
    connection_id: &str,
    state: &Arc<AppState>,
    frame_tx: &mpsc::UnboundedSender<ServerFrame>,
) {
    match frame {
        ClientFrame::ChatMessage {
            message,
            persist,
            ack,
        } => {
            // A chat round trip can wait on the upstream for the full
            // request timeout; take it off the read loop so the
            // connection stays responsive.
            let state = state.clone();
            let frame_tx = frame_tx.clone();
            tokio::spawn(async move {
                handle_chat(state, frame_tx, message, persist.unwrap_or(true), ack).await;
            });
        }
        ClientFrame::SkillRegister { mut skill, ack } => {
            skill.socket_id = Some(connection_id.to_string());
            match state.skills.register(skill).await {
                Ok(skill) => {
                    state
                        .connections
                        .broadcast(ServerFrame::SkillRegistered {
                            skill: skill.clone(),
                        })
                        .await;
                    send_ack(frame_tx, ack, json!({ "ok": true, "skill": skill }));
                }
                Err(e) => send_ack(
                    frame_tx,
                    ack,
                    json!({ "ok": false, "error": e.to_string(), "statusCode": e.status_code() }),
                ),
            }
        }
        ClientFrame::SkillList { status, ack } => {
            let skills = state.skills.list(status).await;
            send_ack(frame_tx, ack, json!({ "ok": true, "skills": skills }));
        }
        ClientFrame::SkillInvoke {
            trigger,
            params,
            ack,
        } => match state.skills.invoke(&trigger, params).await {
            Ok(invocation) => match invocation.outcome {
                InvocationOutcome::Http(result) => send_ack(
                    frame_tx,
                    ack,
                    json!({
                        "ok": true,
                        "skill": invocation.skill.trigger,
                        "name": invocation.skill.name,
                        "result": result,
                    }),
                ),
                InvocationOutcome::Socket { socket_id, params } => {
                    // Check-then-forward: the provider may have vanished
                    // between registration and now. Surface that to the
                    // caller instead of dropping the call.
                    let delivered = state
                        .connections
                        .send_to(
                            &socket_id,
                            ServerFrame::SkillExecute {
                                trigger: invocation.skill.trigger.clone(),
                                params,
                                requester_id: connection_id.to_string(),
                            },
                        )
                        .await;
                    if delivered {
                        send_ack(
                            frame_tx,
                            ack,
                            json!({
                                "ok": true,
                                "skill": invocation.skill.trigger,
                                "name": invocation.skill.name,
                                "result": {
                                    "type": "socket",
                                    "status": "pending",
                                    "socketId": socket_id,
                                },
                            }),
                        );
                    } else {
                        send_ack(
                            frame_tx,
                            ack,
                            json!({ "ok": false, "error": "Skill provider is disconnected" }),
                        );
                    }
                }
            },
            Err(e) => send_ack(
                frame_tx,
                ack,
                json!({ "ok": false, "error": e.to_string(), "statusCode": e.status_code() }),
            ),
        },
        ClientFrame::SkillResult {
            requester_id,
            trigger,
            result,
        } => {
            let delivered = state
                .connections
                .send_to(
                    &requester_id,
                    ServerFrame::SkillResponse { trigger, result },
                )
                .await;
            if !delivered {
                debug!(requester_id = %requester_id, "Requester disconnected; dropping skill result");
            }
        }
    }
}

async fn handle_chat(
    state: Arc<AppState>,
    frame_tx: mpsc::UnboundedSender<ServerFrame>,
    message: String,
    persist: bool,
    ack: Option<u64>,
) {
    match state
        .manager
        .process_message(IncomingMessage {
            text: message,
            persist,
        })
        .await
    {
        Ok(outcome) => {
            let body = chat_body(&outcome);
            let _ = frame_tx.send(ServerFrame::ChatResponse {
                body: body_object(body.clone()),
            });

            let mut ack_body = body_object(body);
            ack_body.insert("ok".to_string(), Value::Bool(true));
            send_ack(&frame_tx, ack, Value::Object(ack_body));
        }
        Err(e) => {
            let _ = frame_tx.send(ServerFrame::ChatError {
                status_code: e.status_code(),
                error: e.to_string(),
                text: e.user_text().to_string(),
            });
            send_ack(
                &frame_tx,
                ack,
                json!({
                    "ok": false,
                    "statusCode": e.status_code(),
                    "error": e.to_string(),
                    "text": e.user_text(),
                }),
            );
        }
    }
}

fn chat_body(outcome: &ChatOutcome) -> Value {
    match outcome {
        ChatOutcome::Command(reply) => json!({
            "status": "command",
            "text": reply.text,
            "message": reply,
        }),
        ChatOutcome::Sent { text, message } => json!({
            "status": "sent",
            "text": text,
            "message": message,
        }),
    }
}

fn send_ack(frame_tx: &mpsc::UnboundedSender<ServerFrame>, ack: Option<u64>, body: Value) {
    if let Some(ack) = ack {
        let _ = frame_tx.send(ServerFrame::Ack {
            ack,
            body: body_object(body),
        });
    }
}
