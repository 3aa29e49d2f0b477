//! Record store seam for the Atrium core.
//!
//! The gateway and command interpreter persist chat turns and manage tasks
//! and calendar events exclusively through the [`Store`] trait. Durability
//! is the backend's concern; [`MemoryStore`] is the process-lifetime
//! implementation used by tests and the development binary.

mod entities;
mod memory;
mod store;

pub use entities::{
    CalendarEvent, ChatMessage, ChatRole, Task, TaskPriority, EventFilter, TaskFilter, TaskUpdate,
};
pub use memory::MemoryStore;
pub use store::{Store, StoreError};
