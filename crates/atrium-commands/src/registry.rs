use std::collections::HashMap;

/// Canonical built-in commands. Aliases resolve here via the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Task,
    Tasks,
    Done,
    Event,
    Events,
    Clear,
    Help,
    Skills,
    Skill,
}

impl CommandKind {
    /// Canonical name used in replies.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Task => "task",
            CommandKind::Tasks => "tasks",
            CommandKind::Done => "done",
            CommandKind::Event => "event",
            CommandKind::Events => "events",
            CommandKind::Clear => "clear",
            CommandKind::Help => "help",
            CommandKind::Skills => "skills",
            CommandKind::Skill => "skill",
        }
    }

    pub fn usage(&self) -> &'static str {
        match self {
            CommandKind::Task => "/task <description> [high|low] — add a task",
            CommandKind::Tasks => "/tasks — list open tasks",
            CommandKind::Done => "/done <id-or-text> — complete a task",
            CommandKind::Event => "/event <description> [today|tomorrow [time] | YYYY-MM-DD] — add an event",
            CommandKind::Events => "/events — list upcoming events",
            CommandKind::Clear => "/clear — clear chat history",
            CommandKind::Help => "/help — show this list",
            CommandKind::Skills => "/skills — list registered skills",
            CommandKind::Skill => "/skill <trigger> [key=value ...] — invoke a skill",
        }
    }
}

/// The full command surface in one table: alias → canonical command.
/// Built once at startup; dispatch is a map lookup, not a conditional
/// chain.
pub struct CommandRegistry {
    aliases: HashMap<&'static str, CommandKind>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut aliases = HashMap::new();
        for (names, kind) in [
            (&["task", "addtask", "t"][..], CommandKind::Task),
            (&["tasks", "list"][..], CommandKind::Tasks),
            (&["done", "complete"][..], CommandKind::Done),
            (&["event", "calendar", "cal"][..], CommandKind::Event),
            (&["events", "upcoming"][..], CommandKind::Events),
            (&["clear", "cls"][..], CommandKind::Clear),
            (&["help"][..], CommandKind::Help),
            (&["skills"][..], CommandKind::Skills),
            (&["skill"][..], CommandKind::Skill),
        ] {
            for name in names {
                aliases.insert(*name, kind);
            }
        }
        Self { aliases }
    }

    /// Case-insensitive alias lookup.
    pub fn resolve(&self, name: &str) -> Option<CommandKind> {
        self.aliases.get(name.to_ascii_lowercase().as_str()).copied()
    }

    /// Canonical commands, one line each, for `/help`.
    pub fn help_lines(&self) -> Vec<&'static str> {
        [
            CommandKind::Task,
            CommandKind::Tasks,
            CommandKind::Done,
            CommandKind::Event,
            CommandKind::Events,
            CommandKind::Skill,
            CommandKind::Skills,
            CommandKind::Clear,
            CommandKind::Help,
        ]
        .iter()
        .map(|kind| kind.usage())
        .collect()
    }
}
