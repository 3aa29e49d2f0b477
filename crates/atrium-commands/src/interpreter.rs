use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use atrium_skills::{InvocationOutcome, SkillDirectory, SkillStatus};
use atrium_store::{EventFilter, Store, TaskFilter, TaskUpdate};

use crate::parse::{parse_skill_params, split_priority, split_when};
use crate::registry::{CommandKind, CommandRegistry};
use crate::reply::CommandReply;

/// Executes built-in slash-commands against the store and the skill
/// directory. Everything here is local: no gateway round trip ever
/// happens inside `interpret`.
pub struct CommandInterpreter {
    store: Arc<dyn Store>,
    skills: Arc<SkillDirectory>,
    registry: CommandRegistry,
}

impl CommandInterpreter {
    pub fn new(store: Arc<dyn Store>, skills: Arc<SkillDirectory>) -> Self {
        Self {
            store,
            skills,
            registry: CommandRegistry::new(),
        }
    }

    /// Interpret chat input. Returns `None` when the text is not a
    /// slash-command and should be forwarded upstream; otherwise returns
    /// the structured reply, including an "unknown command" error for an
    /// unrecognized `/name`.
    pub async fn interpret(&self, text: &str) -> Option<CommandReply> {
        let trimmed = text.trim();
        let rest = trimmed.strip_prefix('/')?;

        let (name, remainder) = match rest.split_once(char::is_whitespace) {
            Some((name, remainder)) => (name, remainder.trim()),
            None => (rest, ""),
        };

        let Some(kind) = self.registry.resolve(name) else {
            debug!(command = %name, "Unknown slash-command");
            return Some(CommandReply::error(
                name,
                format!("Unknown command: /{name}. Try /help."),
            ));
        };

        let reply = match kind {
            CommandKind::Task => self.add_task(kind, remainder).await,
            CommandKind::Tasks => self.list_tasks(kind).await,
            CommandKind::Done => self.complete_task(kind, remainder).await,
            CommandKind::Event => self.add_event(kind, remainder).await,
            CommandKind::Events => self.list_events(kind).await,
            CommandKind::Clear => self.clear_history(kind).await,
            CommandKind::Help => self.help(kind),
            CommandKind::Skills => self.list_skills(kind).await,
            CommandKind::Skill => self.invoke_skill(kind, remainder).await,
        };
        Some(reply)
    }

    async fn add_task(&self, kind: CommandKind, remainder: &str) -> CommandReply {
        if remainder.is_empty() {
            return CommandReply::error(kind.name(), format!("Usage: {}", kind.usage()));
        }

        let (description, priority) = split_priority(remainder);
        match self.store.create_task(description, priority).await {
            Ok(task) => CommandReply::success(
                kind.name(),
                format!("Added task: {} (priority: {})", task.description, priority),
            )
            .with_data(json!({ "id": task.id, "priority": priority.to_string() })),
            Err(e) => CommandReply::error(kind.name(), format!("Could not add task: {e}")),
        }
    }

    async fn list_tasks(&self, kind: CommandKind) -> CommandReply {
        match self.store.query_tasks(TaskFilter { done: Some(false) }).await {
            Ok(tasks) if tasks.is_empty() => CommandReply::info(kind.name(), "No open tasks."),
            Ok(tasks) => {
                let lines: Vec<String> = tasks
                    .iter()
                    .map(|t| format!("• [{}] {} ({})", t.priority, t.description, &t.id[..8]))
                    .collect();
                CommandReply::info(
                    kind.name(),
                    format!("Open tasks:\n{}", lines.join("\n")),
                )
                .with_data(json!({ "tasks": tasks }))
            }
            Err(e) => CommandReply::error(kind.name(), format!("Could not list tasks: {e}")),
        }
    }

    async fn complete_task(&self, kind: CommandKind, remainder: &str) -> CommandReply {
        if remainder.is_empty() {
            return CommandReply::error(kind.name(), format!("Usage: {}", kind.usage()));
        }

        let open = match self.store.query_tasks(TaskFilter { done: Some(false) }).await {
            Ok(tasks) => tasks,
            Err(e) => {
                return CommandReply::error(kind.name(), format!("Could not look up tasks: {e}"))
            }
        };

        let needle = remainder.to_ascii_lowercase();
        let matched = open
            .iter()
            .find(|t| t.id.starts_with(remainder))
            .or_else(|| {
                open.iter()
                    .find(|t| t.description.to_ascii_lowercase().contains(&needle))
            });

        let Some(task) = matched else {
            return CommandReply::error(
                kind.name(),
                format!("No matching open task: {remainder}"),
            );
        };

        match self
            .store
            .update_task(
                &task.id,
                TaskUpdate {
                    done: Some(true),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(task) => CommandReply::success(
                kind.name(),
                format!("Completed task: {}", task.description),
            )
            .with_data(json!({ "id": task.id })),
            Err(e) => CommandReply::error(kind.name(), format!("Could not complete task: {e}")),
        }
    }

    async fn add_event(&self, kind: CommandKind, remainder: &str) -> CommandReply {
        if remainder.is_empty() {
            return CommandReply::error(kind.name(), format!("Usage: {}", kind.usage()));
        }

        let (description, when) = split_when(remainder, Utc::now());
        match self.store.create_event(&description, when).await {
            Ok(event) => CommandReply::success(
                kind.name(),
                format!(
                    "Added event: {} at {}",
                    event.description,
                    event.when.format("%Y-%m-%d %H:%M UTC")
                ),
            )
            .with_data(json!({ "id": event.id, "when": event.when })),
            Err(e) => CommandReply::error(kind.name(), format!("Could not add event: {e}")),
        }
    }

    async fn list_events(&self, kind: CommandKind) -> CommandReply {
        let filter = EventFilter {
            after: Some(Utc::now()),
        };
        match self.store.query_events(filter).await {
            Ok(events) if events.is_empty() => {
                CommandReply::info(kind.name(), "No upcoming events.")
            }
            Ok(events) => {
                let lines: Vec<String> = events
                    .iter()
                    .map(|e| {
                        format!("• {} — {}", e.when.format("%Y-%m-%d %H:%M"), e.description)
                    })
                    .collect();
                CommandReply::info(
                    kind.name(),
                    format!("Upcoming events:\n{}", lines.join("\n")),
                )
                .with_data(json!({ "events": events }))
            }
            Err(e) => CommandReply::error(kind.name(), format!("Could not list events: {e}")),
        }
    }

    async fn clear_history(&self, kind: CommandKind) -> CommandReply {
        match self.store.clear_chat_history().await {
            Ok(removed) => {
                CommandReply::success(kind.name(), format!("Cleared {removed} messages."))
            }
            Err(e) => CommandReply::error(kind.name(), format!("Could not clear history: {e}")),
        }
    }

    fn help(&self, kind: CommandKind) -> CommandReply {
        let lines = self.registry.help_lines().join("\n");
        CommandReply::info(kind.name(), format!("Available commands:\n{lines}"))
    }

    async fn list_skills(&self, kind: CommandKind) -> CommandReply {
        let skills = self.skills.list(None).await;
        if skills.is_empty() {
            return CommandReply::info(kind.name(), "No skills registered.");
        }
        let lines: Vec<String> = skills
            .iter()
            .map(|s| {
                let status = match s.status {
                    SkillStatus::Active => "active",
                    SkillStatus::Inactive => "inactive",
                };
                format!("• /{} — {} ({})", s.trigger, s.description, status)
            })
            .collect();
        CommandReply::info(
            kind.name(),
            format!("Registered skills:\n{}", lines.join("\n")),
        )
        .with_data(json!({ "skills": skills }))
    }

    async fn invoke_skill(&self, kind: CommandKind, remainder: &str) -> CommandReply {
        if remainder.is_empty() {
            return CommandReply::error(kind.name(), format!("Usage: {}", kind.usage()));
        }

        let (trigger, rest) = match remainder.split_once(char::is_whitespace) {
            Some((trigger, rest)) => (trigger, rest.trim()),
            None => (remainder, ""),
        };
        let params = parse_skill_params(rest);

        match self.skills.invoke(trigger, params).await {
            Ok(invocation) => match invocation.outcome {
                InvocationOutcome::Http(result) => {
                    let text = format_result(&result);
                    CommandReply::success(kind.name(), text).with_data(result)
                }
                InvocationOutcome::Socket { socket_id, params } => CommandReply::info(
                    kind.name(),
                    format!(
                        "Skill '{}' is provided by a connected client; invoke it from a connected session.",
                        invocation.skill.trigger
                    ),
                )
                .with_data(json!({
                    "type": "socket",
                    "socketId": socket_id,
                    "params": params,
                })),
            },
            Err(e) => CommandReply::error(kind.name(), e.to_string())
                .with_data(json!({ "statusCode": e.status_code() })),
        }
    }
}

/// Prefer a human `text`/`message` field from an endpoint result;
/// otherwise serialize the raw object.
fn format_result(result: &Value) -> String {
    if let Some(text) = result.get("text").and_then(Value::as_str) {
        return text.to_string();
    }
    if let Some(message) = result.get("message").and_then(Value::as_str) {
        return message.to_string();
    }
    result.to_string()
}
