use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::entities::{
    CalendarEvent, ChatMessage, ChatRole, EventFilter, Task, TaskFilter, TaskPriority, TaskUpdate,
};
use crate::store::{Store, StoreError};

/// In-memory [`Store`] backend. Insertion-ordered, process-lifetime only.
#[derive(Default)]
pub struct MemoryStore {
    messages: RwLock<Vec<ChatMessage>>,
    tasks: RwLock<Vec<Task>>,
    events: RwLock<Vec<CalendarEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_chat_message(
        &self,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn clear_chat_history(&self) -> Result<usize, StoreError> {
        let mut messages = self.messages.write().await;
        let removed = messages.len();
        messages.clear();
        Ok(removed)
    }

    async fn create_task(
        &self,
        description: &str,
        priority: TaskPriority,
    ) -> Result<Task, StoreError> {
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            priority,
            done: false,
            created_at: Utc::now(),
        };
        self.tasks.write().await.push(task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(done) = update.done {
            task.done = done;
        }
        Ok(task.clone())
    }

    async fn query_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .iter()
            .filter(|t| filter.done.is_none_or(|done| t.done == done))
            .cloned()
            .collect())
    }

    async fn create_event(
        &self,
        description: &str,
        when: DateTime<Utc>,
    ) -> Result<CalendarEvent, StoreError> {
        let event = CalendarEvent {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            when,
            created_at: Utc::now(),
        };
        self.events.write().await.push(event.clone());
        Ok(event)
    }

    async fn query_events(&self, filter: EventFilter) -> Result<Vec<CalendarEvent>, StoreError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| filter.after.is_none_or(|after| e.when >= after))
            .cloned()
            .collect())
    }
}
