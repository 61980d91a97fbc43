//! Cloudflare Workers AI Backend
//!
//! This module implements the LlmBackend trait against the Workers AI REST
//! API (`POST /accounts/{account}/ai/run/{model}`). The request body is a
//! chat-style message list; the completion text comes back under
//! `result.response`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LlmBackend, LlmError, Result};
use crate::config::LlmConfig;

/// Per-request timeout; generation can take seconds, not minutes.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Workers AI backend configuration
pub struct WorkersAiBackend {
    /// API base URL (typically https://api.cloudflare.com/client/v4)
    base_url: String,

    /// Cloudflare account identifier
    account_id: String,

    /// Model name to run (e.g., "@cf/meta/llama-3.1-8b-instruct")
    model: String,

    /// Bearer token for the API
    api_token: String,

    /// HTTP client for API requests
    client: Client,
}

impl WorkersAiBackend {
    /// Create a new Workers AI backend from configuration
    ///
    /// The API token is read from the environment variable named by
    /// `config.api_token_env` so the token never lands in the config file.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_token = std::env::var(&config.api_token_env).map_err(|_| {
            LlmError::AuthenticationFailed(format!(
                "environment variable {} is not set",
                config.api_token_env
            ))
        })?;

        Ok(Self::new(
            &config.base_url,
            &config.account_id,
            &config.model,
            api_token,
        ))
    }

    /// Create a new Workers AI backend
    pub fn new(
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        model: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            account_id: account_id.into(),
            model: model.into(),
            api_token: api_token.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    fn run_url(&self) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url, self.account_id, self.model
        )
    }
}

#[async_trait]
impl LlmBackend for WorkersAiBackend {
    fn name(&self) -> &str {
        "workers_ai"
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = RunRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        tracing::debug!(
            "Workers AI request: model={}, system_chars={}, user_chars={}",
            self.model,
            system_prompt.len(),
            user_prompt.len()
        );

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(self.run_url())
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else if e.is_connect() {
                    LlmError::ProviderUnavailable(format!(
                        "Cannot connect to Workers AI at {}",
                        self.base_url
                    ))
                } else {
                    LlmError::NetworkError(e.to_string())
                }
            })?;

        tracing::debug!(
            "Workers AI response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthenticationFailed(text),
                429 => LlmError::RateLimitExceeded,
                500..=599 => LlmError::ProviderUnavailable(format!(
                    "Workers AI error ({}): {}",
                    status, text
                )),
                _ => LlmError::InvalidRequest(format!("Workers AI error ({}): {}", status, text)),
            });
        }

        let body: RunResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse Workers AI response: {}", e)))?;

        if !body.success {
            let detail = body
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(LlmError::InvalidRequest(detail));
        }

        match body.result {
            Some(result) => Ok(result.response),
            None => Err(LlmError::ParseError(
                "No result object in Workers AI response".to_string(),
            )),
        }
    }
}

/// Workers AI run request format
#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
}

/// Chat message in the Workers AI request
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Workers AI run response envelope
#[derive(Debug, Deserialize)]
struct RunResponse {
    success: bool,
    #[serde(default)]
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

/// The generated completion
#[derive(Debug, Deserialize)]
struct RunResult {
    response: String,
}

/// Error entry in the response envelope
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_properties() {
        let backend = WorkersAiBackend::new(
            "https://api.cloudflare.com/client/v4",
            "acct-123",
            "@cf/meta/llama-3.1-8b-instruct",
            "token",
        );

        assert_eq!(backend.name(), "workers_ai");
        assert_eq!(
            backend.run_url(),
            "https://api.cloudflare.com/client/v4/accounts/acct-123/ai/run/@cf/meta/llama-3.1-8b-instruct"
        );
    }

    #[test]
    fn test_missing_token_env_is_auth_failure() {
        let config = LlmConfig {
            api_token_env: "DEALCOACH_TEST_TOKEN_THAT_DOES_NOT_EXIST".to_string(),
            ..Default::default()
        };

        let err = WorkersAiBackend::from_config(&config).err();
        assert!(matches!(err, Some(LlmError::AuthenticationFailed(_))));
    }
}
