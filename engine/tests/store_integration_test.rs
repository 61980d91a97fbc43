//! Integration tests for SQLite persistence
//!
//! Validates the session store and checkpoint store against a real database
//! file, including schema-tolerant loading of documents written by older
//! engine versions.

use tempfile::TempDir;

use dealcoach_engine::agent::{ActionItem, ActionOwner, FinalReport, Message, SessionState};
use dealcoach_engine::db::{CheckpointStore, Database, SessionStore};

async fn open_db(temp: &TempDir) -> Database {
    Database::new(&temp.path().join("test.db")).await.unwrap()
}

#[tokio::test]
async fn test_save_load_round_trip() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let store = db.sessions();

    let mut state = SessionState::default();
    state.messages.push(Message::user("hello"));
    state.messages.push(Message::assistant("hi there"));
    state.user_turn_count = 1;
    state.rolling_summary = "a promising intro call".to_string();
    state.deal_memory.budget = "120k".to_string();
    state.final_report = Some(FinalReport {
        summary_bullets: vec!["went well".to_string()],
        action_items: vec![ActionItem {
            owner: ActionOwner::Rep,
            item: "send recap".to_string(),
        }],
        followup_email: "Hi,".to_string(),
    });

    store.save("s1", &state).await.unwrap();
    let loaded = store.load("s1").await.unwrap();

    assert_eq!(loaded, state);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_load_missing_key_returns_default() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let store = db.sessions();

    let state = store.load("never-seen").await.unwrap();
    assert_eq!(state, SessionState::default());

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_save_overwrites_previous_state() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let store = db.sessions();

    let mut state = SessionState::default();
    state.user_turn_count = 1;
    store.save("s1", &state).await.unwrap();

    state.user_turn_count = 2;
    state.messages.push(Message::user("second"));
    store.save("s1", &state).await.unwrap();

    let loaded = store.load("s1").await.unwrap();
    assert_eq!(loaded.user_turn_count, 2);
    assert_eq!(loaded.messages.len(), 1);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_reset_erases_the_row() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let store = db.sessions();

    let mut state = SessionState::default();
    state.user_turn_count = 5;
    store.save("s1", &state).await.unwrap();

    store.reset("s1").await.unwrap();

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE session_key = 's1'")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(rows, 0);

    let fresh = store.load("s1").await.unwrap();
    assert_eq!(fresh, SessionState::default());

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_load_tolerates_legacy_document_shape() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let store = db.sessions();

    // A document from an imaginary older version: missing fields, a
    // wrong-typed turn counter, and one malformed transcript entry.
    let legacy = r#"{
        "messages": [
            {"role": "user", "content": "still here"},
            {"role": "oracle", "content": "dropped"}
        ],
        "dealMemory": {"company": "Acme", "objections": "not-a-list"},
        "userTurnCount": "many"
    }"#;

    sqlx::query("INSERT INTO sessions (session_key, state, updated_at) VALUES ('old', ?, 0)")
        .bind(legacy)
        .execute(db.pool())
        .await
        .unwrap();

    let state = store.load("old").await.unwrap();
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].content, "still here");
    assert_eq!(state.deal_memory.company, "Acme");
    assert!(state.deal_memory.objections.is_empty());
    assert_eq!(state.user_turn_count, 0);
    assert!(state.rolling_summary.is_empty());
    assert!(state.final_report.is_none());

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_load_tolerates_corrupted_document() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let store = db.sessions();

    sqlx::query("INSERT INTO sessions (session_key, state, updated_at) VALUES ('bad', 'not json', 0)")
        .execute(db.pool())
        .await
        .unwrap();

    let state = store.load("bad").await.unwrap();
    assert_eq!(state, SessionState::default());

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_checkpoints_latest_payload_wins_and_clear() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;
    let checkpoints = db.checkpoints();

    checkpoints
        .record("run-1", "s1", "summary", "[\"old\"]")
        .await
        .unwrap();
    checkpoints
        .record("run-2", "s1", "summary", "[\"new\"]")
        .await
        .unwrap();
    checkpoints
        .record("run-1", "s1", "email", "hello")
        .await
        .unwrap();
    checkpoints
        .record("run-9", "other", "summary", "[\"elsewhere\"]")
        .await
        .unwrap();

    let steps = checkpoints.completed_steps("s1").await.unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps.get("summary").map(String::as_str), Some("[\"new\"]"));
    assert_eq!(steps.get("email").map(String::as_str), Some("hello"));

    checkpoints.clear_session("s1").await.unwrap();
    assert!(checkpoints.completed_steps("s1").await.unwrap().is_empty());

    // Other sessions are untouched.
    let other = checkpoints.completed_steps("other").await.unwrap();
    assert_eq!(other.len(), 1);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_stores_share_one_database() {
    let temp = TempDir::new().unwrap();
    let db = open_db(&temp).await;

    let store = db.sessions();
    let checkpoints = db.checkpoints();

    store.save("s1", &SessionState::default()).await.unwrap();
    checkpoints.record("r", "s1", "summary", "[]").await.unwrap();

    assert_eq!(store.load("s1").await.unwrap(), SessionState::default());
    assert_eq!(checkpoints.completed_steps("s1").await.unwrap().len(), 1);

    db.close().await.unwrap();
}
