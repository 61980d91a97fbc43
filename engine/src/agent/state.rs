//! Session State Types
//!
//! The per-session record: transcript, structured deal memory, rolling
//! summary, turn counter, and the final report once a call has been ended.
//! All types serialize with camelCase keys; that is the shape stored in the
//! database and the shape the extraction prompts ask the model to produce.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::deal_memory::DealMemory;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    /// Renders the uppercase form used in `ROLE: content` prompt lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "USER"),
            Role::Assistant => write!(f, "ASSISTANT"),
        }
    }
}

/// One transcript entry. Immutable once appended; conversation order is
/// append order and is never reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Owner of a finalization action item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionOwner {
    Rep,
    Customer,
}

/// One action item from the end-of-call report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionItem {
    pub owner: ActionOwner,
    pub item: String,
}

/// End-of-call report produced by the finalization pipeline.
///
/// Absent until finalization completes; a rerun overwrites it wholesale
/// (last writer wins).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FinalReport {
    pub summary_bullets: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub followup_email: String,
}

/// Full state of one coaching session.
///
/// `user_turn_count` counts every accepted user turn ever seen, including
/// turns whose messages have been evicted from the capped transcript.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub messages: Vec<Message>,
    pub deal_memory: DealMemory,
    pub rolling_summary: String,
    pub user_turn_count: u64,
    #[serde(rename = "final", skip_serializing_if = "Option::is_none")]
    pub final_report: Option<FinalReport>,
}
