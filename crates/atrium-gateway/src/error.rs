use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Upstream gateway is not configured")]
    NotConfigured,

    #[error("Timed out waiting for upstream reply")]
    Timeout,

    #[error("Upstream connect failed: {0}")]
    ConnectFailed(String),

    #[error("Failed to send message upstream: {0}")]
    SendFailed(String),

    #[error("Gateway server error: {0}")]
    Server(String),
}

impl GatewayError {
    /// HTTP-equivalent status code for socket acks and error frames.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NotConfigured => 503,
            GatewayError::Timeout => 504,
            GatewayError::ConnectFailed(_) | GatewayError::SendFailed(_) => 502,
            GatewayError::Server(_) => 500,
        }
    }

    /// Human-readable text so chat callers always have something to
    /// render, even on failure.
    pub fn user_text(&self) -> &'static str {
        match self {
            GatewayError::NotConfigured => {
                "The assistant is not configured. Set UPSTREAM_GATEWAY_URL and UPSTREAM_GATEWAY_TOKEN."
            }
            GatewayError::Timeout => "The assistant did not reply in time. Please try again.",
            GatewayError::ConnectFailed(_) | GatewayError::SendFailed(_) => {
                "The assistant is unreachable right now. Please try again."
            }
            GatewayError::Server(_) => "Something went wrong handling the message.",
        }
    }
}
