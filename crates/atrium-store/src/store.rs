use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{
    CalendarEvent, ChatMessage, ChatRole, EventFilter, Task, TaskFilter, TaskPriority, TaskUpdate,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Persistence seam for the gateway core.
///
/// The core only ever calls these operations; it never reads a chat
/// message back after writing it.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_chat_message(
        &self,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;

    async fn clear_chat_history(&self) -> Result<usize, StoreError>;

    async fn create_task(
        &self,
        description: &str,
        priority: TaskPriority,
    ) -> Result<Task, StoreError>;

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError>;

    async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Task, StoreError>;

    async fn query_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, StoreError>;

    async fn create_event(
        &self,
        description: &str,
        when: chrono::DateTime<chrono::Utc>,
    ) -> Result<CalendarEvent, StoreError>;

    async fn query_events(&self, filter: EventFilter) -> Result<Vec<CalendarEvent>, StoreError>;
}
