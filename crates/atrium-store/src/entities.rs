use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a persisted chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One persisted turn of the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Normal => write!(f, "normal"),
            TaskPriority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub priority: TaskPriority,
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub description: String,
    pub when: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Filter for task queries. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFilter {
    pub done: Option<bool>,
}

/// Filter for event queries. `after` keeps events at or past the instant.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFilter {
    pub after: Option<DateTime<Utc>>,
}

/// Partial update applied to a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub done: Option<bool>,
}
