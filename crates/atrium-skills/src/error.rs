use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("Invalid skill registration: {0}")]
    Validation(String),

    #[error("Trigger already registered: {0}")]
    Conflict(String),

    #[error("Skill not found: {0}")]
    NotFound(String),

    #[error("Skill is inactive: {0}")]
    Inactive(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Skill endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Skill has no endpoint or socket handler configured: {0}")]
    NotConfigured(String),

    #[error("Skill registry is full (limit: {0})")]
    RegistryFull(usize),
}

impl SkillError {
    /// HTTP-equivalent status code for surfacing over acks and routes.
    pub fn status_code(&self) -> u16 {
        match self {
            SkillError::Validation(_) | SkillError::MissingParameter(_) => 400,
            SkillError::NotFound(_) => 404,
            SkillError::Conflict(_) => 409,
            SkillError::Inactive(_) | SkillError::RegistryFull(_) => 503,
            SkillError::Upstream { .. } => 502,
            SkillError::NotConfigured(_) => 500,
        }
    }
}
