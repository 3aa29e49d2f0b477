//! End-to-end socket tests: multiple clients against a real server, and
//! the WebSocket transport against a scripted upstream.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite;

use atrium_commands::CommandInterpreter;
use atrium_gateway::testing::MockTransport;
use atrium_gateway::upstream::UpstreamTransport;
use atrium_gateway::{
    ChatOutcome, GatewayConfig, GatewayManager, GatewayServer, IncomingMessage, WsTransport,
};
use atrium_skills::{NewSkill, SkillDirectory};
use atrium_store::{MemoryStore, Store};

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestGateway {
    url: String,
    skills: Arc<SkillDirectory>,
}

async fn start_gateway() -> TestGateway {
    let store = Arc::new(MemoryStore::new());
    let skills = Arc::new(SkillDirectory::new());
    let interpreter = Arc::new(CommandInterpreter::new(
        store.clone() as Arc<dyn Store>,
        skills.clone(),
    ));
    let transport = Arc::new(MockTransport::new());
    let manager = GatewayManager::new(
        GatewayConfig::new("ws://upstream.test/socket", "tok"),
        store as Arc<dyn Store>,
        interpreter,
        transport as Arc<dyn UpstreamTransport>,
    )
    .with_reconnect(1, Duration::from_millis(10))
    .with_request_timeout(Duration::from_secs(2));

    let server = GatewayServer::new(manager, skills.clone());
    let app = server.router();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestGateway {
        url: format!("ws://127.0.0.1:{}", addr.port()),
        skills,
    }
}

async fn connect(url: &str) -> WsClient {
    let (ws_stream, _) = tokio_tungstenite::connect_async(format!("{}/ws", url))
        .await
        .unwrap();
    ws_stream
}

async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for frame")
        .unwrap()
        .unwrap();
    serde_json::from_str(&msg.into_text().unwrap()).unwrap()
}

async fn recv_until<F>(ws: &mut WsClient, mut pred: F) -> serde_json::Value
where
    F: FnMut(&serde_json::Value) -> bool,
{
    for _ in 0..20 {
        let frame = recv_json(ws).await;
        if pred(&frame) {
            return frame;
        }
    }
    panic!("expected frame never arrived");
}

async fn recv_ack(ws: &mut WsClient, ack: u64) -> serde_json::Value {
    recv_until(ws, |frame| frame["type"] == "ack" && frame["ack"] == ack).await
}

fn register_frame(name: &str, trigger: &str, ack: u64) -> serde_json::Value {
    serde_json::json!({
        "type": "skill:register",
        "name": name,
        "description": format!("{name} skill"),
        "trigger": trigger,
        "ack": ack,
    })
}

#[tokio::test]
async fn test_skill_registered_is_broadcast_to_other_clients() {
    let gateway = start_gateway().await;
    let mut observer = connect(&gateway.url).await;
    let mut provider = connect(&gateway.url).await;

    send_json(&mut provider, register_frame("Weather", "/weather", 1)).await;
    recv_ack(&mut provider, 1).await;

    let broadcast = recv_until(&mut observer, |f| f["type"] == "skill:registered").await;
    assert_eq!(broadcast["skill"]["trigger"], "weather");
    assert_eq!(broadcast["skill"]["name"], "Weather");
}

#[tokio::test]
async fn test_socket_skill_invoke_execute_result_chain() {
    let gateway = start_gateway().await;
    let mut provider = connect(&gateway.url).await;
    let mut requester = connect(&gateway.url).await;

    send_json(&mut provider, register_frame("Lights", "lights", 1)).await;
    recv_ack(&mut provider, 1).await;

    send_json(
        &mut requester,
        serde_json::json!({
            "type": "skill:invoke",
            "trigger": "/lights",
            "params": { "room": "kitchen" },
            "ack": 2,
        }),
    )
    .await;

    // The provider receives the forwarded execution request.
    let execute = recv_until(&mut provider, |f| f["type"] == "skill:execute").await;
    assert_eq!(execute["trigger"], "lights");
    assert_eq!(execute["params"]["room"], "kitchen");
    let requester_id = execute["requesterId"].as_str().unwrap().to_string();

    // The requester is acked with the pending descriptor.
    let ack = recv_ack(&mut requester, 2).await;
    assert_eq!(ack["ok"], true);
    assert_eq!(ack["result"]["type"], "socket");
    assert_eq!(ack["result"]["status"], "pending");

    // The provider reports the result; it is relayed to the requester.
    send_json(
        &mut provider,
        serde_json::json!({
            "type": "skill:result",
            "requesterId": requester_id,
            "trigger": "lights",
            "result": { "ok": true, "state": "on" },
        }),
    )
    .await;

    let response = recv_until(&mut requester, |f| f["type"] == "skill:response").await;
    assert_eq!(response["trigger"], "lights");
    assert_eq!(response["result"]["state"], "on");
}

#[tokio::test]
async fn test_invoke_with_stale_provider_reports_disconnected() {
    let gateway = start_gateway().await;

    // A skill whose registered connection never existed on this server:
    // discovered in the directory, unreachable on the socket.
    gateway
        .skills
        .register(NewSkill {
            name: "Ghost".to_string(),
            description: "Stale provider".to_string(),
            trigger: "ghost".to_string(),
            socket_id: Some("long-gone-connection".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let mut requester = connect(&gateway.url).await;
    send_json(
        &mut requester,
        serde_json::json!({
            "type": "skill:invoke",
            "trigger": "ghost",
            "params": {},
            "ack": 1,
        }),
    )
    .await;

    let ack = recv_ack(&mut requester, 1).await;
    assert_eq!(ack["ok"], false);
    assert_eq!(ack["error"], "Skill provider is disconnected");
}

#[tokio::test]
async fn test_disconnect_removes_only_that_connections_skills() {
    let gateway = start_gateway().await;
    let mut observer = connect(&gateway.url).await;
    let mut provider_a = connect(&gateway.url).await;
    let mut provider_b = connect(&gateway.url).await;

    send_json(&mut provider_a, register_frame("One", "one", 1)).await;
    recv_ack(&mut provider_a, 1).await;
    send_json(&mut provider_a, register_frame("Two", "two", 2)).await;
    recv_ack(&mut provider_a, 2).await;
    send_json(&mut provider_b, register_frame("Three", "three", 3)).await;
    recv_ack(&mut provider_b, 3).await;

    let a_socket_id = gateway
        .skills
        .find_by_trigger("one")
        .await
        .unwrap()
        .socket_id
        .unwrap();

    provider_a.close(None).await.unwrap();

    let unregistered =
        recv_until(&mut observer, |f| f["type"] == "skill:unregistered").await;
    assert_eq!(unregistered["socketId"], a_socket_id.as_str());
    assert_eq!(unregistered["count"], 2);

    // Only provider B's registration survives.
    let remaining = gateway.skills.list(None).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].trigger, "three");

    // B is still serviceable.
    send_json(
        &mut provider_b,
        serde_json::json!({ "type": "skill:list", "ack": 4 }),
    )
    .await;
    let ack = recv_ack(&mut provider_b, 4).await;
    assert_eq!(ack["skills"].as_array().unwrap().len(), 1);
}

// -- WsTransport against a scripted upstream -------------------------------

/// Fake upstream agent: accepts the socket, requires a bearer token, and
/// echoes every envelope back as a correlated reply.
async fn start_fake_upstream() -> String {
    async fn ws_handler(headers: HeaderMap, ws: WebSocketUpgrade) -> impl IntoResponse {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("Bearer "));
        if !authorized {
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
        ws.on_upgrade(echo_socket).into_response()
    }

    async fn echo_socket(mut socket: WebSocket) {
        while let Some(Ok(msg)) = socket.recv().await {
            let AxumMessage::Text(text) = msg else { continue };
            let envelope: serde_json::Value = serde_json::from_str(&text).unwrap();
            let reply = serde_json::json!({
                "requestId": envelope["requestId"],
                "text": format!("echo: {}", envelope["text"].as_str().unwrap_or_default()),
            });
            if socket
                .send(AxumMessage::text(reply.to_string()))
                .await
                .is_err()
            {
                break;
            }
        }
    }

    let app = Router::new().route("/socket", axum::routing::any(ws_handler));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://127.0.0.1:{}/socket", addr.port())
}

#[tokio::test]
async fn test_ws_transport_round_trip_against_real_upstream() {
    let upstream_url = start_fake_upstream().await;

    let store = Arc::new(MemoryStore::new());
    let skills = Arc::new(SkillDirectory::new());
    let interpreter = Arc::new(CommandInterpreter::new(
        store.clone() as Arc<dyn Store>,
        skills,
    ));
    let manager = GatewayManager::new(
        GatewayConfig::new(upstream_url, "secret-token"),
        store as Arc<dyn Store>,
        interpreter,
        Arc::new(WsTransport::new()) as Arc<dyn UpstreamTransport>,
    )
    .with_reconnect(2, Duration::from_millis(50))
    .with_request_timeout(Duration::from_secs(5));

    manager.init().await.unwrap();

    let outcome = manager
        .process_message(IncomingMessage {
            text: "ping".to_string(),
            persist: false,
        })
        .await
        .unwrap();

    match outcome {
        ChatOutcome::Sent { text, .. } => assert_eq!(text, "echo: ping"),
        other => panic!("expected sent outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ws_transport_connect_failure_surfaces() {
    let transport = WsTransport::new();
    let result = transport.connect("ws://127.0.0.1:1/socket", "tok").await;
    assert!(result.is_err());
}
