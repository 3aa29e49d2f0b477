use serde::{Deserialize, Serialize};

/// Upstream gateway connection settings.
///
/// Read from `UPSTREAM_GATEWAY_URL` and `UPSTREAM_GATEWAY_TOKEN`. Either
/// one missing means "not configured": sends fail fast instead of
/// queueing, a distinct failure mode from a temporary disconnect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: Some(normalize_ws_url(&url.into())),
            token: Some(token.into()),
        }
    }

    pub fn from_env() -> Self {
        Self {
            url: read_env("UPSTREAM_GATEWAY_URL").map(|url| normalize_ws_url(&url)),
            token: read_env("UPSTREAM_GATEWAY_TOKEN"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.token.is_some()
    }
}

fn read_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

/// Accept http(s) URLs and normalize them to their ws(s) equivalent.
fn normalize_ws_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        return format!("wss://{rest}");
    }
    if let Some(rest) = url.strip_prefix("http://") {
        return format!("ws://{rest}");
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_urls_normalize_to_ws() {
        let config = GatewayConfig::new("http://agent.local:9000/socket", "tok");
        assert_eq!(config.url.as_deref(), Some("ws://agent.local:9000/socket"));

        let config = GatewayConfig::new("https://agent.local/socket", "tok");
        assert_eq!(config.url.as_deref(), Some("wss://agent.local/socket"));
    }

    #[test]
    fn test_ws_urls_pass_through() {
        let config = GatewayConfig::new("wss://agent.local/socket", "tok");
        assert_eq!(config.url.as_deref(), Some("wss://agent.local/socket"));
    }

    #[test]
    fn test_partial_config_is_not_configured() {
        let url_only = GatewayConfig {
            url: Some("ws://agent.local".to_string()),
            token: None,
        };
        assert!(!url_only.is_configured());

        let token_only = GatewayConfig {
            url: None,
            token: Some("tok".to_string()),
        };
        assert!(!token_only.is_configured());

        assert!(!GatewayConfig::default().is_configured());
        assert!(GatewayConfig::new("ws://x", "t").is_configured());
    }
}
