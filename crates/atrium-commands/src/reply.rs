use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    Success,
    Error,
    Info,
}

/// Structured result of a slash-command.
///
/// This struct — not a bare string — is what gets persisted and returned
/// to the caller, so the UI can render command output distinctly.
#[derive(Debug, Clone, Serialize)]
pub struct CommandReply {
    pub command: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: ReplyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReply {
    pub fn success(command: &str, text: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            text: text.into(),
            kind: ReplyKind::Success,
            data: None,
        }
    }

    pub fn error(command: &str, text: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            text: text.into(),
            kind: ReplyKind::Error,
            data: None,
        }
    }

    pub fn info(command: &str, text: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            text: text.into(),
            kind: ReplyKind::Info,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
