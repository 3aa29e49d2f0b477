use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::SkillError;
use crate::model::{
    Invocation, InvocationOutcome, NewSkill, Skill, SkillStatus, SkillUpdate,
};

const DEFAULT_MAX_SKILLS: usize = 1024;

/// Normalize a trigger: trim, strip one leading slash, lowercase.
///
/// `/Weather` and `weather` both normalize to `weather`, so callers may
/// use either form interchangeably.
pub(crate) fn normalize_trigger(trigger: &str) -> String {
    let trimmed = trigger.trim();
    let stripped = trimmed.strip_prefix('/').unwrap_or(trimmed);
    stripped.to_ascii_lowercase()
}

fn is_valid_trigger(trigger: &str) -> bool {
    !trigger.is_empty()
        && trigger
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

/// Capability registry. Owns every [`Skill`] record for the process
/// lifetime; insertion order is preserved for listing.
pub struct SkillDirectory {
    skills: RwLock<Vec<Skill>>,
    max_skills: usize,
    http_client: reqwest::Client,
}

impl Default for SkillDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillDirectory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SKILLS)
    }

    /// Registry bounded to `max_skills` entries. Registration past the
    /// bound is rejected rather than evicting a live provider.
    pub fn with_capacity(max_skills: usize) -> Self {
        Self {
            skills: RwLock::new(Vec::new()),
            max_skills,
            http_client: reqwest::Client::new(),
        }
    }

    /// Register a new skill. The uniqueness check and the insert happen
    /// under one write-lock hold, so two racing registrations of the same
    /// trigger cannot both succeed.
    pub async fn register(&self, new: NewSkill) -> Result<Skill, SkillError> {
        if new.name.trim().is_empty() {
            return Err(SkillError::Validation("name is required".into()));
        }
        if new.description.trim().is_empty() {
            return Err(SkillError::Validation("description is required".into()));
        }
        let trigger = normalize_trigger(&new.trigger);
        if !is_valid_trigger(&trigger) {
            return Err(SkillError::Validation(format!(
                "trigger must match [a-z0-9_-]+, got: {:?}",
                new.trigger
            )));
        }

        let mut skills = self.skills.write().await;
        if skills.iter().any(|s| s.trigger == trigger) {
            return Err(SkillError::Conflict(trigger));
        }
        if skills.len() >= self.max_skills {
            return Err(SkillError::RegistryFull(self.max_skills));
        }

        let skill = Skill {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            description: new.description,
            trigger,
            parameters: new.parameters,
            endpoint: new.endpoint,
            socket_id: new.socket_id,
            status: SkillStatus::Active,
            registered_at: Utc::now(),
        };
        skills.push(skill.clone());
        info!(skill_id = %skill.id, trigger = %skill.trigger, "Registered skill");
        Ok(skill)
    }

    /// List skills in insertion order, optionally filtered by status.
    pub async fn list(&self, status: Option<SkillStatus>) -> Vec<Skill> {
        let skills = self.skills.read().await;
        skills
            .iter()
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<Skill> {
        let skills = self.skills.read().await;
        skills.iter().find(|s| s.id == id).cloned()
    }

    /// Look up by trigger. The input is normalized first, so `/weather`
    /// and `weather` resolve to the same skill.
    pub async fn find_by_trigger(&self, trigger: &str) -> Option<Skill> {
        let trigger = normalize_trigger(trigger);
        let skills = self.skills.read().await;
        skills.iter().find(|s| s.trigger == trigger).cloned()
    }

    /// Apply a partial update. Only name, description, parameters,
    /// endpoint, and status are mutable; the trigger never changes.
    pub async fn update(&self, id: &str, update: SkillUpdate) -> Result<Skill, SkillError> {
        let mut skills = self.skills.write().await;
        let skill = skills
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SkillError::NotFound(id.to_string()))?;

        if let Some(name) = update.name {
            skill.name = name;
        }
        if let Some(description) = update.description {
            skill.description = description;
        }
        if let Some(parameters) = update.parameters {
            skill.parameters = parameters;
        }
        if let Some(endpoint) = update.endpoint {
            skill.endpoint = Some(endpoint);
        }
        if let Some(status) = update.status {
            skill.status = status;
        }
        Ok(skill.clone())
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut skills = self.skills.write().await;
        let before = skills.len();
        skills.retain(|s| s.id != id);
        skills.len() != before
    }

    /// Remove every skill registered by the given connection. Returns the
    /// removal count so the router can broadcast what disappeared.
    pub async fn remove_by_connection(&self, socket_id: &str) -> usize {
        let mut skills = self.skills.write().await;
        let before = skills.len();
        skills.retain(|s| s.socket_id.as_deref() != Some(socket_id));
        let removed = before - skills.len();
        if removed > 0 {
            info!(socket_id = %socket_id, count = removed, "Removed skills for closed connection");
        }
        removed
    }

    /// Resolve a skill by trigger and dispatch it.
    ///
    /// Resolution order: unknown trigger, inactive status, then missing
    /// required parameters — all checked before any network call. Dispatch
    /// prefers the HTTP endpoint; a socket-backed skill yields a
    /// descriptor for the caller to forward.
    pub async fn invoke(
        &self,
        trigger: &str,
        params: Map<String, Value>,
    ) -> Result<Invocation, SkillError> {
        let skill = self
            .find_by_trigger(trigger)
            .await
            .ok_or_else(|| SkillError::NotFound(normalize_trigger(trigger)))?;

        if skill.status != SkillStatus::Active {
            return Err(SkillError::Inactive(skill.trigger.clone()));
        }

        for parameter in skill.parameters.iter().filter(|p| p.required) {
            let missing = match params.get(&parameter.name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if missing {
                return Err(SkillError::MissingParameter(parameter.name.clone()));
            }
        }

        if let Some(endpoint) = skill.endpoint.clone() {
            let result = self.dispatch_http(&skill.trigger, &endpoint, &params).await?;
            return Ok(Invocation {
                skill,
                outcome: InvocationOutcome::Http(result),
            });
        }

        if let Some(socket_id) = skill.socket_id.clone() {
            debug!(trigger = %skill.trigger, socket_id = %socket_id, "Skill resolved to socket dispatch");
            return Ok(Invocation {
                skill,
                outcome: InvocationOutcome::Socket { socket_id, params },
            });
        }

        Err(SkillError::NotConfigured(skill.trigger.clone()))
    }

    async fn dispatch_http(
        &self,
        trigger: &str,
        endpoint: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, SkillError> {
        let body = serde_json::json!({
            "skill": trigger,
            "params": params,
        });

        let response = self
            .http_client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SkillError::Upstream {
                status: 502,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SkillError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| SkillError::Upstream {
            status: status.as_u16(),
            body: format!("invalid response body: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SkillParameter;

    fn weather_skill() -> NewSkill {
        NewSkill {
            name: "Weather".to_string(),
            description: "Get weather".to_string(),
            trigger: "/weather".to_string(),
            parameters: vec![SkillParameter {
                name: "city".to_string(),
                kind: Some("string".to_string()),
                required: true,
                description: None,
            }],
            endpoint: None,
            socket_id: None,
        }
    }

    #[tokio::test]
    async fn test_register_normalizes_trigger() {
        let directory = SkillDirectory::new();
        let skill = directory.register(weather_skill()).await.unwrap();
        assert_eq!(skill.trigger, "weather");
        assert_eq!(skill.status, SkillStatus::Active);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_fields() {
        let directory = SkillDirectory::new();

        let result = directory
            .register(NewSkill {
                name: "  ".to_string(),
                description: "desc".to_string(),
                trigger: "x".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(SkillError::Validation(_))));

        let result = directory
            .register(NewSkill {
                name: "n".to_string(),
                description: String::new(),
                trigger: "x".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(SkillError::Validation(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_trigger_charset() {
        let directory = SkillDirectory::new();
        let result = directory
            .register(NewSkill {
                name: "n".to_string(),
                description: "d".to_string(),
                trigger: "/bad trigger!".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(SkillError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicate_trigger_conflicts_regardless_of_status() {
        let directory = SkillDirectory::new();
        let first = directory.register(weather_skill()).await.unwrap();

        directory
            .update(
                &first.id,
                SkillUpdate {
                    status: Some(SkillStatus::Inactive),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Slashed and unslashed forms normalize to the same trigger.
        let mut dup = weather_skill();
        dup.trigger = "weather".to_string();
        let result = directory.register(dup).await;
        assert!(matches!(result, Err(SkillError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_find_by_trigger_normalization_idempotence() {
        let directory = SkillDirectory::new();
        let registered = directory.register(weather_skill()).await.unwrap();

        let slashed = directory.find_by_trigger("/weather").await.unwrap();
        let bare = directory.find_by_trigger("weather").await.unwrap();
        assert_eq!(slashed.id, registered.id);
        assert_eq!(bare.id, registered.id);
    }

    #[tokio::test]
    async fn test_update_mutates_allowed_fields_only() {
        let directory = SkillDirectory::new();
        let skill = directory.register(weather_skill()).await.unwrap();

        let updated = directory
            .update(
                &skill.id,
                SkillUpdate {
                    name: Some("Forecast".to_string()),
                    status: Some(SkillStatus::Inactive),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Forecast");
        assert_eq!(updated.status, SkillStatus::Inactive);
        assert_eq!(updated.trigger, "weather");
        assert_eq!(updated.description, "Get weather");
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let directory = SkillDirectory::new();
        let result = directory.update("nope", SkillUpdate::default()).await;
        assert!(matches!(result, Err(SkillError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let directory = SkillDirectory::new();
        let a = directory
            .register(NewSkill {
                name: "A".to_string(),
                description: "a".to_string(),
                trigger: "a".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        directory
            .register(NewSkill {
                name: "B".to_string(),
                description: "b".to_string(),
                trigger: "b".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        directory
            .update(
                &a.id,
                SkillUpdate {
                    status: Some(SkillStatus::Inactive),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(directory.list(None).await.len(), 2);
        let active = directory.list(Some(SkillStatus::Active)).await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].trigger, "b");
    }

    #[tokio::test]
    async fn test_remove_by_connection_exactness_and_idempotence() {
        let directory = SkillDirectory::new();
        for (trigger, socket) in [("a1", "A"), ("a2", "A"), ("b1", "B")] {
            directory
                .register(NewSkill {
                    name: trigger.to_string(),
                    description: "d".to_string(),
                    trigger: trigger.to_string(),
                    socket_id: Some(socket.to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        assert_eq!(directory.remove_by_connection("A").await, 2);
        assert_eq!(directory.remove_by_connection("A").await, 0);

        let remaining = directory.list(None).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].trigger, "b1");
    }

    #[tokio::test]
    async fn test_registry_capacity() {
        let directory = SkillDirectory::with_capacity(1);
        directory
            .register(NewSkill {
                name: "A".to_string(),
                description: "a".to_string(),
                trigger: "a".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let result = directory
            .register(NewSkill {
                name: "B".to_string(),
                description: "b".to_string(),
                trigger: "b".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(SkillError::RegistryFull(1))));
    }

    #[tokio::test]
    async fn test_invoke_unknown_trigger() {
        let directory = SkillDirectory::new();
        let result = directory.invoke("ghost", Map::new()).await;
        assert!(matches!(result, Err(SkillError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invoke_inactive_skill() {
        let directory = SkillDirectory::new();
        let mut new = weather_skill();
        new.parameters.clear();
        let skill = directory.register(new).await.unwrap();
        directory
            .update(
                &skill.id,
                SkillUpdate {
                    status: Some(SkillStatus::Inactive),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let result = directory.invoke("weather", Map::new()).await;
        assert!(matches!(result, Err(SkillError::Inactive(_))));
    }

    #[tokio::test]
    async fn test_invoke_missing_required_parameter_before_any_dispatch() {
        let directory = SkillDirectory::new();
        let mut new = weather_skill();
        // Endpoint is unreachable on purpose: the parameter check must
        // fail before any network call is attempted.
        new.endpoint = Some("http://127.0.0.1:1/never".to_string());
        directory.register(new).await.unwrap();

        let result = directory.invoke("weather", Map::new()).await;
        match result {
            Err(SkillError::MissingParameter(name)) => assert_eq!(name, "city"),
            other => panic!("expected MissingParameter, got {other:?}"),
        }

        // Empty-string values count as missing too.
        let mut params = Map::new();
        params.insert("city".to_string(), Value::String("  ".to_string()));
        let result = directory.invoke("weather", params).await;
        assert!(matches!(result, Err(SkillError::MissingParameter(_))));
    }

    #[tokio::test]
    async fn test_invoke_without_endpoint_or_socket() {
        let directory = SkillDirectory::new();
        let mut new = weather_skill();
        new.parameters.clear();
        directory.register(new).await.unwrap();

        let result = directory.invoke("weather", Map::new()).await;
        assert!(matches!(result, Err(SkillError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_invoke_socket_skill_returns_descriptor() {
        let directory = SkillDirectory::new();
        let mut new = weather_skill();
        new.parameters.clear();
        new.socket_id = Some("conn-7".to_string());
        directory.register(new).await.unwrap();

        let mut params = Map::new();
        params.insert("city".to_string(), Value::String("Lisbon".to_string()));
        let invocation = directory.invoke("/weather", params.clone()).await.unwrap();

        match invocation.outcome {
            InvocationOutcome::Socket { socket_id, params: forwarded } => {
                assert_eq!(socket_id, "conn-7");
                assert_eq!(forwarded, params);
            }
            other => panic!("expected socket dispatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invoke_prefers_endpoint_over_socket() {
        // A skill carrying both never consults socket_id: the HTTP path
        // wins, and here it fails as Upstream rather than dispatching.
        let directory = SkillDirectory::new();
        let mut new = weather_skill();
        new.parameters.clear();
        new.endpoint = Some("http://127.0.0.1:1/never".to_string());
        new.socket_id = Some("conn-7".to_string());
        directory.register(new).await.unwrap();

        let result = directory.invoke("weather", Map::new()).await;
        assert!(matches!(result, Err(SkillError::Upstream { .. })));
    }

    async fn serve_endpoint(
        status: axum::http::StatusCode,
        body: &'static str,
    ) -> String {
        use axum::routing::post;
        let app = axum::Router::new().route(
            "/hook",
            post(move || async move { (status, body) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{}/hook", addr.port())
    }

    #[tokio::test]
    async fn test_invoke_http_success() {
        let endpoint = serve_endpoint(
            axum::http::StatusCode::OK,
            r#"{"text": "sunny, 22C"}"#,
        )
        .await;

        let directory = SkillDirectory::new();
        let mut new = weather_skill();
        new.endpoint = Some(endpoint);
        directory.register(new).await.unwrap();

        let mut params = Map::new();
        params.insert("city".to_string(), Value::String("Lisbon".to_string()));
        let invocation = directory.invoke("weather", params).await.unwrap();

        match invocation.outcome {
            InvocationOutcome::Http(result) => {
                assert_eq!(result["text"], "sunny, 22C");
            }
            other => panic!("expected http result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invoke_http_non_2xx_surfaces_upstream_error() {
        let endpoint =
            serve_endpoint(axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom").await;

        let directory = SkillDirectory::new();
        let mut new = weather_skill();
        new.parameters.clear();
        new.endpoint = Some(endpoint);
        directory.register(new).await.unwrap();

        let result = directory.invoke("weather", Map::new()).await;
        match result {
            Err(SkillError::Upstream { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }
}
