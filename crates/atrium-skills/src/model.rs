use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    Active,
    Inactive,
}

/// One declared parameter of a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillParameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// A registered capability.
///
/// Dispatched via `endpoint` when set, otherwise forwarded to the live
/// connection identified by `socket_id`. Field names are camelCase on the
/// wire to match the socket protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub trigger: String,
    #[serde(default)]
    pub parameters: Vec<SkillParameter>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub socket_id: Option<String>,
    pub status: SkillStatus,
    pub registered_at: DateTime<Utc>,
}

/// Registration input. The directory assigns `id` and `registered_at`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSkill {
    pub name: String,
    pub description: String,
    pub trigger: String,
    #[serde(default)]
    pub parameters: Vec<SkillParameter>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub socket_id: Option<String>,
}

/// Partial update. The trigger is immutable after registration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parameters: Option<Vec<SkillParameter>>,
    pub endpoint: Option<String>,
    pub status: Option<SkillStatus>,
}

/// How a resolved skill should be (or was) executed.
#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    /// The endpoint answered 2xx; the parsed body is the result.
    Http(Value),
    /// The caller must forward the call to this live connection. The
    /// directory never touches socket objects itself.
    Socket {
        socket_id: String,
        params: Map<String, Value>,
    },
}

/// A resolved invocation: the matched skill plus its dispatch outcome.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub skill: Skill,
    pub outcome: InvocationOutcome,
}
