//! Session Turn Processing
//!
//! This module implements the per-turn state machine for one coaching
//! session:
//!
//! 1. Load state and append the user turn
//! 2. Render the recent context window
//! 3. Call the backend for a coaching reply and parse it
//! 4. Every third user turn, run memory consolidation (failures absorbed)
//! 5. Append the assistant reply, enforce the transcript cap, persist
//!
//! A failed reply call never crashes the turn or corrupts stored state: the
//! caller gets a fixed apology and persisted state stays at the pre-turn
//! snapshot, so the turn count does not advance for failed attempts.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::SessionStore;
use crate::llm::LlmBackend;

use super::deal_memory::{extract_memory_json, DealMemory};
use super::parser::parse_reply;
use super::prompts;
use super::registry::SessionRegistry;
use super::state::{FinalReport, Message, SessionState};

/// Stored transcript cap; oldest messages are dropped first. The turn
/// counter keeps counting turns whose messages have been evicted.
pub const MAX_STORED_MESSAGES: usize = 40;

/// Memory consolidation fires on every Nth accepted user turn
pub const CONSOLIDATE_EVERY: u64 = 3;

/// Reply returned when the primary generation call fails
pub const BACKEND_FAILURE_REPLY: &str =
    "Sorry, I hit a snag putting together coaching for that one. Give it another try in a moment.";

/// Result of one accepted chat turn
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub reply: String,
    pub follow_ups: Vec<String>,
    pub deal_memory: DealMemory,
    pub rolling_summary: String,
    pub user_turn_count: u64,
}

/// Owns turn processing for all sessions; one logical actor per key.
///
/// All mutating operations on a session acquire that key's registry guard
/// first, so writes to one session happen in some serial order while
/// different sessions proceed in parallel. Backend calls are made while
/// holding only the session's own guard.
pub struct CoachAgent {
    backend: Arc<dyn LlmBackend>,
    store: Arc<dyn SessionStore>,
    registry: SessionRegistry,
}

impl CoachAgent {
    /// Create a new agent over the given backend and store
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        store: Arc<dyn SessionStore>,
        registry: SessionRegistry,
    ) -> Self {
        Self {
            backend,
            store,
            registry,
        }
    }

    /// Process one user turn for a session
    pub async fn process_turn(&self, session_key: &str, message: &str) -> Result<TurnOutcome> {
        let guard = self.registry.guard(session_key).await;
        let _serialized = guard.lock().await;

        let mut state = self
            .store
            .load(session_key)
            .await
            .context("Failed to load session state")?;

        // Snapshot for the failure path: nothing below is persisted until
        // the save at the end, so these are the last persisted values.
        let persisted_memory = state.deal_memory.clone();
        let persisted_summary = state.rolling_summary.clone();
        let persisted_count = state.user_turn_count;

        state.messages.push(Message::user(message));
        state.user_turn_count += 1;

        let recent = prompts::render_recent_context(&state.messages);
        let system_prompt = prompts::coaching_system_prompt();
        let user_prompt =
            prompts::coaching_user_prompt(&state.rolling_summary, &state.deal_memory, &recent);

        let raw = match self.backend.generate(&system_prompt, &user_prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Primary generation failed for session {} at turn {}: {}",
                    session_key, state.user_turn_count, e
                );
                return Ok(TurnOutcome {
                    reply: BACKEND_FAILURE_REPLY.to_string(),
                    follow_ups: Vec::new(),
                    deal_memory: persisted_memory,
                    rolling_summary: persisted_summary,
                    user_turn_count: persisted_count,
                });
            }
        };

        let parsed = parse_reply(&raw);

        if state.user_turn_count % CONSOLIDATE_EVERY == 0 {
            self.consolidate(session_key, &mut state, &recent).await;
        }

        state.messages.push(Message::assistant(&parsed.reply));
        enforce_message_cap(&mut state.messages);

        self.store
            .save(session_key, &state)
            .await
            .context("Failed to save session state")?;

        info!(
            "Session {} turn {} complete ({} messages retained)",
            session_key,
            state.user_turn_count,
            state.messages.len()
        );

        Ok(TurnOutcome {
            reply: parsed.reply,
            follow_ups: parsed.follow_ups,
            deal_memory: state.deal_memory,
            rolling_summary: state.rolling_summary,
            user_turn_count: state.user_turn_count,
        })
    }

    /// Read a session's current state under its guard
    pub async fn state(&self, session_key: &str) -> Result<SessionState> {
        let guard = self.registry.guard(session_key).await;
        let _serialized = guard.lock().await;
        self.store
            .load(session_key)
            .await
            .context("Failed to load session state")
    }

    /// Erase a session; a subsequent load returns the default state
    pub async fn reset(&self, session_key: &str) -> Result<()> {
        let guard = self.registry.guard(session_key).await;
        let _serialized = guard.lock().await;
        self.store
            .reset(session_key)
            .await
            .context("Failed to reset session")
    }

    /// Write the end-of-call report through the single-writer path.
    ///
    /// Rerunning finalization overwrites an existing report wholesale.
    pub async fn save_final(&self, session_key: &str, report: FinalReport) -> Result<()> {
        let guard = self.registry.guard(session_key).await;
        let _serialized = guard.lock().await;

        let mut state = self
            .store
            .load(session_key)
            .await
            .context("Failed to load session state")?;
        state.final_report = Some(report);
        self.store
            .save(session_key, &state)
            .await
            .context("Failed to save final report")
    }

    /// Re-extract structured memory and refresh the rolling summary.
    ///
    /// Every failure mode here is absorbed: a failed call or unparseable
    /// output leaves memory unchanged and never fails the turn.
    async fn consolidate(&self, session_key: &str, state: &mut SessionState, recent: &str) {
        let system_prompt = prompts::extraction_system_prompt();
        let user_prompt =
            prompts::extraction_user_prompt(&state.rolling_summary, &state.deal_memory, recent);

        let raw = match self.backend.generate(&system_prompt, &user_prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Memory consolidation call failed for session {}: {}",
                    session_key, e
                );
                return;
            }
        };

        let Some(extracted) = extract_memory_json(&raw) else {
            debug!(
                "Memory consolidation produced unparseable output for session {}",
                session_key
            );
            return;
        };

        state.deal_memory = state.deal_memory.merged(&extracted);
        if let Some(summary) = extracted.get("rollingSummary").and_then(|v| v.as_str()) {
            if !summary.trim().is_empty() {
                state.rolling_summary = summary.trim().to_string();
            }
        }

        debug!(
            "Session {} memory consolidated at turn {}",
            session_key, state.user_turn_count
        );
    }
}

fn enforce_message_cap(messages: &mut Vec<Message>) {
    if messages.len() > MAX_STORED_MESSAGES {
        let excess = messages.len() - MAX_STORED_MESSAGES;
        messages.drain(..excess);
    }
}
