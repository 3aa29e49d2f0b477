//! In-process capability directory.
//!
//! Skills are registered by bots over the socket (or programmatically),
//! looked up by a normalized trigger, and invoked either through an HTTP
//! endpoint or by handing the caller a socket-dispatch descriptor. The
//! directory owns every skill record; nothing else mutates them.

mod directory;
mod error;
mod model;

pub use directory::SkillDirectory;
pub use error::SkillError;
pub use model::{
    Invocation, InvocationOutcome, NewSkill, Skill, SkillParameter, SkillStatus, SkillUpdate,
};
