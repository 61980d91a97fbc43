//! LLM Backend Abstraction Layer
//!
//! This module provides a common interface for generative text backends. The
//! LlmBackend trait defines the contract the session agent and the
//! finalization pipeline depend on, so tests can substitute a deterministic
//! scripted backend for the real HTTP provider.

use async_trait::async_trait;

pub mod workers_ai;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl LlmError {
    /// Whether a retry with backoff has a chance of succeeding.
    ///
    /// Authentication and request-shape failures will fail the same way on
    /// every attempt; the finalization pipeline only retries the rest.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::ProviderUnavailable(_)
                | LlmError::RateLimitExceeded
                | LlmError::NetworkError(_)
                | LlmError::Timeout
        )
    }
}

/// Generative text backend that all providers must implement
///
/// The contract is deliberately narrow: one system prompt, one user prompt,
/// one free-text completion. Everything the engine knows about output shape
/// lives in the prompts and the parsers, not in the transport.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Returns the name of the backend (e.g., "workers_ai")
    fn name(&self) -> &str;

    /// Generate a completion for the given prompts
    ///
    /// # Arguments
    /// * `system_prompt` - Persona, guardrails, and output-format instructions
    /// * `user_prompt` - The task-specific prompt body
    ///
    /// # Returns
    /// * `Ok(String)` - The raw completion text
    /// * `Err(LlmError)` - If the request fails at the transport level
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(LlmError::ProviderUnavailable("down".into()).is_transient());
        assert!(LlmError::RateLimitExceeded.is_transient());
        assert!(LlmError::NetworkError("reset".into()).is_transient());
        assert!(LlmError::Timeout.is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(!LlmError::AuthenticationFailed("bad token".into()).is_transient());
        assert!(!LlmError::InvalidRequest("bad payload".into()).is_transient());
        assert!(!LlmError::ParseError("not json".into()).is_transient());
    }
}
