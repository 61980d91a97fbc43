//! Session-Addressed Service Facade
//!
//! The single entry point an outer transport layer would call. Validates
//! inputs, delegates turn processing to the session agent, and launches
//! finalization runs in the background.

use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::agent::{CoachAgent, FinalReport, SessionRegistry, SessionState, TurnOutcome};
use crate::db::{CheckpointStore, SessionStore};
use crate::finalize::{FinalizePipeline, RetryPolicy};
use crate::llm::LlmBackend;

/// Upper bound on a chat message, in bytes
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Upper bound on a session key, in bytes
pub const MAX_SESSION_KEY_LEN: usize = 128;

/// Errors surfaced to the caller of the facade
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("session key must not be empty")]
    EmptySessionKey,

    #[error("session key exceeds {MAX_SESSION_KEY_LEN} bytes")]
    SessionKeyTooLong,

    #[error("message must not be empty")]
    EmptyMessage,

    #[error("message exceeds {MAX_MESSAGE_LEN} bytes")]
    MessageTooLong,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    /// Validation errors are the caller's fault and mutate nothing
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Storage(_))
    }
}

/// The deal coaching service
pub struct CoachService {
    agent: Arc<CoachAgent>,
    pipeline: Arc<FinalizePipeline>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl CoachService {
    /// Wire up the service over a backend and stores
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        store: Arc<dyn SessionStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        retry: RetryPolicy,
    ) -> Self {
        let registry = SessionRegistry::new();
        let agent = Arc::new(CoachAgent::new(backend.clone(), store, registry));
        let pipeline = Arc::new(FinalizePipeline::new(
            backend,
            agent.clone(),
            checkpoints.clone(),
            retry,
        ));

        Self {
            agent,
            pipeline,
            checkpoints,
        }
    }

    /// Process one user turn
    pub async fn chat(&self, session_key: &str, message: &str) -> Result<TurnOutcome, ServiceError> {
        validate_session_key(session_key)?;
        validate_message(message)?;

        Ok(self.agent.process_turn(session_key, message).await?)
    }

    /// Read a session's current state (diagnostic / polling)
    pub async fn get_state(&self, session_key: &str) -> Result<SessionState, ServiceError> {
        validate_session_key(session_key)?;
        Ok(self.agent.state(session_key).await?)
    }

    /// Erase a session and its finalization checkpoints
    pub async fn reset(&self, session_key: &str) -> Result<(), ServiceError> {
        validate_session_key(session_key)?;
        self.agent.reset(session_key).await?;
        self.checkpoints.clear_session(session_key).await?;
        Ok(())
    }

    /// Start finalization for a session.
    ///
    /// Returns the run id immediately; the pipeline runs on a background
    /// task and callers poll `get_state` until the report is present. A
    /// caller that stops polling does not cancel the run.
    pub async fn end_call(&self, session_key: &str) -> Result<String, ServiceError> {
        validate_session_key(session_key)?;

        let run_id = Uuid::new_v4().to_string();
        let pipeline = self.pipeline.clone();
        let key = session_key.to_string();
        let id = run_id.clone();

        tokio::spawn(async move {
            if let Err(e) = pipeline.run(&key, &id).await {
                error!("Finalization run {} failed for session {}: {}", id, key, e);
            }
        });

        Ok(run_id)
    }

    /// Write a final report through the single-writer path.
    ///
    /// The pipeline's last step uses this; it is exposed for completeness
    /// and for drivers that assemble reports out of band.
    pub async fn save_final(
        &self,
        session_key: &str,
        report: FinalReport,
    ) -> Result<(), ServiceError> {
        validate_session_key(session_key)?;
        Ok(self.agent.save_final(session_key, report).await?)
    }
}

fn validate_session_key(session_key: &str) -> Result<(), ServiceError> {
    if session_key.trim().is_empty() {
        return Err(ServiceError::EmptySessionKey);
    }
    if session_key.len() > MAX_SESSION_KEY_LEN {
        return Err(ServiceError::SessionKeyTooLong);
    }
    Ok(())
}

fn validate_message(message: &str) -> Result<(), ServiceError> {
    if message.trim().is_empty() {
        return Err(ServiceError::EmptyMessage);
    }
    if message.len() > MAX_MESSAGE_LEN {
        return Err(ServiceError::MessageTooLong);
    }
    Ok(())
}
