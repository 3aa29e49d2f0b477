//! Slash-command interpreter.
//!
//! Recognizes built-in `/commands` in chat input and executes them locally
//! against the store and the skill directory — no gateway round trip.
//! Anything that is not a recognized command is left for the gateway to
//! forward upstream.

mod interpreter;
mod parse;
mod registry;
mod reply;

pub use interpreter::CommandInterpreter;
pub use registry::{CommandKind, CommandRegistry};
pub use reply::{CommandReply, ReplyKind};
