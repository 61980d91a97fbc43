//! Session State Persistence
//!
//! One row per session key, with the full session state stored as a JSON
//! document. Loading is schema-tolerant: a document written by an older
//! version of the engine (missing fields, wrong types) is rebuilt field by
//! field from defaults instead of failing the load.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::warn;

use crate::agent::{DealMemory, FinalReport, Message, SessionState};

/// Durable key-value store for session state.
///
/// `load` of an unknown key returns the default state; `reset` erases the
/// key so a subsequent `load` starts fresh.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_key: &str) -> Result<SessionState>;
    async fn save(&self, session_key: &str, state: &SessionState) -> Result<()>;
    async fn reset(&self, session_key: &str) -> Result<()>;
}

/// SQLite-backed session store
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_key: &str) -> Result<SessionState> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT state FROM sessions WHERE session_key = ?")
                .bind(session_key)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load session state")?;

        Ok(match row {
            Some(raw) => decode_state(&raw),
            None => SessionState::default(),
        })
    }

    async fn save(&self, session_key: &str, state: &SessionState) -> Result<()> {
        let raw = serde_json::to_string(state).context("Failed to serialize session state")?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;

        sqlx::query(
            "INSERT INTO sessions (session_key, state, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(session_key) DO UPDATE SET state = excluded.state, \
             updated_at = excluded.updated_at",
        )
        .bind(session_key)
        .bind(raw)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to save session state")?;

        Ok(())
    }

    async fn reset(&self, session_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE session_key = ?")
            .bind(session_key)
            .execute(&self.pool)
            .await
            .context("Failed to reset session")?;

        Ok(())
    }
}

/// In-memory session store for tests and ephemeral runs
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_key: &str) -> Result<SessionState> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(session_key).cloned().unwrap_or_default())
    }

    async fn save(&self, session_key: &str, state: &SessionState) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session_key.to_string(), state.clone());
        Ok(())
    }

    async fn reset(&self, session_key: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_key);
        Ok(())
    }
}

/// Rebuild a well-formed state from a possibly partial stored document.
///
/// Every field falls back to its default independently; a malformed
/// transcript entry is skipped rather than discarding the whole transcript,
/// and a wholly unreadable document yields the default state.
pub fn decode_state(raw: &str) -> SessionState {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Stored session state is not valid JSON, starting fresh: {}", e);
            return SessionState::default();
        }
    };

    let mut state = SessionState::default();

    if let Some(items) = value.get("messages").and_then(Value::as_array) {
        state.messages = items
            .iter()
            .filter_map(|m| serde_json::from_value::<Message>(m.clone()).ok())
            .collect();
    }

    if let Some(memory) = value.get("dealMemory") {
        // The merge rules double as tolerant per-field decoding.
        state.deal_memory = DealMemory::default().merged(memory);
    }

    if let Some(summary) = value.get("rollingSummary").and_then(Value::as_str) {
        state.rolling_summary = summary.to_string();
    }

    if let Some(count) = value.get("userTurnCount").and_then(Value::as_u64) {
        state.user_turn_count = count;
    }

    if let Some(report) = value.get("final") {
        state.final_report = serde_json::from_value::<FinalReport>(report.clone()).ok();
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Role;

    #[tokio::test]
    async fn test_in_memory_load_missing_key_is_default() {
        let store = InMemorySessionStore::new();
        let state = store.load("nope").await.unwrap();
        assert_eq!(state, SessionState::default());
    }

    #[tokio::test]
    async fn test_in_memory_save_load_reset() {
        let store = InMemorySessionStore::new();

        let mut state = SessionState::default();
        state.user_turn_count = 7;
        store.save("s1", &state).await.unwrap();

        let loaded = store.load("s1").await.unwrap();
        assert_eq!(loaded.user_turn_count, 7);

        store.reset("s1").await.unwrap();
        let fresh = store.load("s1").await.unwrap();
        assert_eq!(fresh, SessionState::default());
    }

    #[test]
    fn test_decode_state_full_round_trip() {
        let mut state = SessionState::default();
        state.messages.push(Message::user("hi"));
        state.messages.push(Message::assistant("hello"));
        state.user_turn_count = 1;
        state.rolling_summary = "intro".to_string();

        let raw = serde_json::to_string(&state).unwrap();
        assert_eq!(decode_state(&raw), state);
    }

    #[test]
    fn test_decode_state_not_json() {
        assert_eq!(decode_state("definitely not json"), SessionState::default());
    }

    #[test]
    fn test_decode_state_defaults_missing_fields() {
        let state = decode_state(r#"{"userTurnCount": 12}"#);
        assert_eq!(state.user_turn_count, 12);
        assert!(state.messages.is_empty());
        assert!(state.rolling_summary.is_empty());
        assert!(state.final_report.is_none());
    }

    #[test]
    fn test_decode_state_defaults_wrong_types_independently() {
        let raw = r#"{
            "messages": "not an array",
            "dealMemory": {"budget": "90k", "painPoints": 42},
            "rollingSummary": 17,
            "userTurnCount": "three",
            "final": []
        }"#;

        let state = decode_state(raw);
        assert!(state.messages.is_empty());
        assert_eq!(state.deal_memory.budget, "90k");
        assert!(state.deal_memory.pain_points.is_empty());
        assert!(state.rolling_summary.is_empty());
        assert_eq!(state.user_turn_count, 0);
        assert!(state.final_report.is_none());
    }

    #[test]
    fn test_decode_state_skips_malformed_messages() {
        let raw = r#"{
            "messages": [
                {"role": "user", "content": "good"},
                {"role": "narrator", "content": "bad role"},
                {"content": "missing role"},
                {"role": "assistant", "content": "also good"}
            ]
        }"#;

        let state = decode_state(raw);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[1].role, Role::Assistant);
    }
}
