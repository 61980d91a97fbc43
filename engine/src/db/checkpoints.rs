//! Finalization Checkpoint Persistence
//!
//! One row per completed pipeline step. A rerun for the same session picks
//! up the latest payload per step instead of regenerating it, which is what
//! makes the pipeline resumable after a partial failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Durable record of completed finalization steps
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Record a completed step's payload
    async fn record(
        &self,
        run_id: &str,
        session_key: &str,
        step: &str,
        payload: &str,
    ) -> Result<()>;

    /// Latest payload per completed step for a session
    async fn completed_steps(&self, session_key: &str) -> Result<HashMap<String, String>>;

    /// Drop all checkpoints for a session (used by reset)
    async fn clear_session(&self, session_key: &str) -> Result<()>;
}

/// SQLite-backed checkpoint store
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn record(
        &self,
        run_id: &str,
        session_key: &str,
        step: &str,
        payload: &str,
    ) -> Result<()> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;

        sqlx::query(
            "INSERT INTO finalize_checkpoints (run_id, session_key, step, payload, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(session_key)
        .bind(step)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to record finalization checkpoint")?;

        Ok(())
    }

    async fn completed_steps(&self, session_key: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query(
            "SELECT step, payload FROM finalize_checkpoints \
             WHERE session_key = ? ORDER BY id ASC",
        )
        .bind(session_key)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load finalization checkpoints")?;

        // Later rows overwrite earlier ones, so the newest payload wins.
        let mut steps = HashMap::new();
        for row in rows {
            steps.insert(row.get("step"), row.get("payload"));
        }

        Ok(steps)
    }

    async fn clear_session(&self, session_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM finalize_checkpoints WHERE session_key = ?")
            .bind(session_key)
            .execute(&self.pool)
            .await
            .context("Failed to clear finalization checkpoints")?;

        Ok(())
    }
}

/// In-memory checkpoint store for tests
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    rows: Mutex<Vec<(String, String, String, String)>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn record(
        &self,
        run_id: &str,
        session_key: &str,
        step: &str,
        payload: &str,
    ) -> Result<()> {
        let mut rows = self.rows.lock().await;
        rows.push((
            run_id.to_string(),
            session_key.to_string(),
            step.to_string(),
            payload.to_string(),
        ));
        Ok(())
    }

    async fn completed_steps(&self, session_key: &str) -> Result<HashMap<String, String>> {
        let rows = self.rows.lock().await;
        let mut steps = HashMap::new();
        for (_, key, step, payload) in rows.iter() {
            if key == session_key {
                steps.insert(step.clone(), payload.clone());
            }
        }
        Ok(steps)
    }

    async fn clear_session(&self, session_key: &str) -> Result<()> {
        let mut rows = self.rows.lock().await;
        rows.retain(|(_, key, _, _)| key != session_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_latest_payload_wins() {
        let store = InMemoryCheckpointStore::new();
        store.record("run1", "s1", "summary", "old").await.unwrap();
        store.record("run2", "s1", "summary", "new").await.unwrap();

        let steps = store.completed_steps("s1").await.unwrap();
        assert_eq!(steps.get("summary").map(String::as_str), Some("new"));
    }

    #[tokio::test]
    async fn test_in_memory_sessions_are_isolated() {
        let store = InMemoryCheckpointStore::new();
        store.record("run1", "s1", "summary", "a").await.unwrap();
        store.record("run1", "s2", "summary", "b").await.unwrap();

        let s1 = store.completed_steps("s1").await.unwrap();
        assert_eq!(s1.len(), 1);
        assert_eq!(s1.get("summary").map(String::as_str), Some("a"));

        store.clear_session("s1").await.unwrap();
        assert!(store.completed_steps("s1").await.unwrap().is_empty());
        assert_eq!(store.completed_steps("s2").await.unwrap().len(), 1);
    }
}
