use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use crate::error::ExchangeError;
use crate::store::is_shell_safe;
use crate::upstream::UpstreamToken;

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_USER_AGENT: &str = "GitHub-Copilot-Helper";
const TOKEN_PATH: &str = "/copilot_internal/v2/token";

/// Body of `GET /copilot_internal/v2/token`. Only `token` is required.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub refresh_in: Option<u64>,
}

#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Makes exactly one attempt; retrying is the caller's decision.
    async fn exchange(&self, upstream: &UpstreamToken) -> Result<String, ExchangeError>;
}

#[derive(Debug, Clone)]
pub struct CopilotTokenExchanger {
    client: Arc<ClientWithMiddleware>,
    api_base_url: String,
    user_agent: String,
}

impl CopilotTokenExchanger {
    pub fn new(client: Arc<ClientWithMiddleware>) -> Self {
        Self {
            client,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn token_url(&self) -> String {
        format!("{}{}", self.api_base_url, TOKEN_PATH)
    }
}

#[async_trait]
impl TokenExchanger for CopilotTokenExchanger {
    async fn exchange(&self, upstream: &UpstreamToken) -> Result<String, ExchangeError> {
        let response = self
            .client
            .get(self.token_url())
            .header("Authorization", format!("Bearer {}", upstream.value))
            .header("Accept", "application/json")
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        if response.status() == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            return Err(ExchangeError::ProxyAuthRequired);
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        match serde_json::from_slice::<TokenResponse>(&body) {
            Ok(parsed) if !parsed.token.trim().is_empty() => {
                debug!(
                    "Copilot token received (expires_at={:?}, refresh_in={:?})",
                    parsed.expires_at, parsed.refresh_in
                );
                Ok(parsed.token)
            }
            Ok(parsed) if !is_shell_safe(&parsed.token) => Err(ExchangeError::MalformedBody(
                "token contains a quote or control character".to_string(),
            )),
            Ok(_) => Err(ExchangeError::MalformedBody("empty token".to_string())),
            Err(e) => {
                let body_str = String::from_utf8_lossy(&body);
                error!("Failed to parse Copilot token response: {body_str}");
                Err(ExchangeError::MalformedBody(e.to_string()))
            }
        }
    }
}
