use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use atrium_skills::{NewSkill, Skill, SkillStatus};

/// Inbound frames from socket clients (browsers and skill bots).
///
/// Frames are JSON tagged by `type`; an optional `ack` token is echoed
/// back in the matching [`ServerFrame::Ack`] so fire-and-forget callers
/// can skip it.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "chat:message")]
    ChatMessage {
        message: String,
        #[serde(default)]
        persist: Option<bool>,
        #[serde(default)]
        ack: Option<u64>,
    },
    #[serde(rename = "skill:register")]
    SkillRegister {
        #[serde(flatten)]
        skill: NewSkill,
        #[serde(default)]
        ack: Option<u64>,
    },
    #[serde(rename = "skill:list")]
    SkillList {
        #[serde(default)]
        status: Option<SkillStatus>,
        #[serde(default)]
        ack: Option<u64>,
    },
    #[serde(rename = "skill:invoke")]
    SkillInvoke {
        trigger: String,
        #[serde(default)]
        params: Map<String, Value>,
        #[serde(default)]
        ack: Option<u64>,
    },
    #[serde(rename = "skill:result")]
    SkillResult {
        #[serde(rename = "requesterId")]
        requester_id: String,
        trigger: String,
        #[serde(default)]
        result: Value,
    },
}

/// Outbound frames to socket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "gateway:status")]
    GatewayStatus { status: String },
    #[serde(rename = "chat:response")]
    ChatResponse {
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    #[serde(rename = "chat:error")]
    ChatError {
        #[serde(rename = "statusCode")]
        status_code: u16,
        error: String,
        text: String,
    },
    #[serde(rename = "skill:registered")]
    SkillRegistered { skill: Skill },
    #[serde(rename = "skill:unregistered")]
    SkillUnregistered {
        #[serde(rename = "socketId")]
        socket_id: String,
        count: usize,
    },
    #[serde(rename = "skill:execute")]
    SkillExecute {
        trigger: String,
        params: Map<String, Value>,
        #[serde(rename = "requesterId")]
        requester_id: String,
    },
    #[serde(rename = "skill:response")]
    SkillResponse { trigger: String, result: Value },
    #[serde(rename = "ack")]
    Ack {
        ack: u64,
        #[serde(flatten)]
        body: Map<String, Value>,
    },
}

/// One outbound request frame to the upstream agent.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamEnvelope {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A reply frame from the upstream agent, matched to its request by
/// correlation id.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamReply {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl UpstreamReply {
    /// The reply body: `text` preferred, `message` accepted.
    pub fn body(&self) -> &str {
        self.text
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or_default()
    }
}

/// Helper for building ack/response bodies out of `json!` objects.
pub fn body_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}
