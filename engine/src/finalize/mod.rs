//! Finalization Pipeline
//!
//! Turns a finished call's transcript into a structured report through three
//! strictly sequential generation steps: summary bullets, action items, and
//! a follow-up email draft. The pipeline is an explicit saga: each step is
//! retried with backoff on transient backend failure, and each completed
//! step persists a checkpoint so a rerun for the same session resumes from
//! the last completed step instead of regenerating everything. The final
//! report write is last-writer-wins, which makes the whole run idempotent.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::agent::{prompts, ActionItem, ActionOwner, CoachAgent, FinalReport};
use crate::db::CheckpointStore;
use crate::llm::{LlmBackend, LlmError};

/// Step names used as checkpoint keys
pub const STEP_SUMMARY: &str = "summary";
pub const STEP_ACTION_ITEMS: &str = "action_items";
pub const STEP_EMAIL: &str = "email";

/// Retry policy applied to each generation step independently
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per step, including the first
    pub max_attempts: u32,

    /// Delay before the first retry; doubles after each failed attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Errors that can end a finalization run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("session key must not be empty")]
    MissingSessionKey,

    #[error("step {step} failed after {attempts} attempts: {source}")]
    StepExhausted {
        step: &'static str,
        attempts: u32,
        source: LlmError,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// The end-of-call report generator
pub struct FinalizePipeline {
    backend: Arc<dyn LlmBackend>,
    agent: Arc<CoachAgent>,
    checkpoints: Arc<dyn CheckpointStore>,
    retry: RetryPolicy,
}

impl FinalizePipeline {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        agent: Arc<CoachAgent>,
        checkpoints: Arc<dyn CheckpointStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            agent,
            checkpoints,
            retry,
        }
    }

    /// Run the pipeline for a session.
    ///
    /// A missing session key is fatal before any step runs. A session with
    /// an empty transcript still completes and yields a degenerate report.
    /// Callers do not block on this; they poll the session state until the
    /// report appears.
    pub async fn run(&self, session_key: &str, run_id: &str) -> Result<FinalReport, PipelineError> {
        if session_key.trim().is_empty() {
            return Err(PipelineError::MissingSessionKey);
        }

        info!(
            "Finalization run {} started for session {}",
            run_id, session_key
        );

        let state = self.agent.state(session_key).await?;
        let transcript = prompts::render_transcript(&state.messages);
        let transcript = if transcript.is_empty() {
            "(no conversation recorded)".to_string()
        } else {
            transcript
        };
        let deal_facts = serde_json::to_string_pretty(&state.deal_memory)
            .unwrap_or_else(|_| "{}".to_string());

        let completed = match self.checkpoints.completed_steps(session_key).await {
            Ok(steps) => steps,
            Err(e) => {
                // Losing checkpoints only costs regeneration, never the run.
                warn!(
                    "Could not read checkpoints for session {}: {}",
                    session_key, e
                );
                Default::default()
            }
        };

        // Step: summary bullets
        let bullets = match completed
            .get(STEP_SUMMARY)
            .and_then(|p| serde_json::from_str::<Vec<String>>(p).ok())
        {
            Some(bullets) => {
                info!("Run {} reusing checkpointed summary", run_id);
                bullets
            }
            None => {
                let raw = self
                    .generate_step(
                        STEP_SUMMARY,
                        "You summarize sales coaching calls. Respond with a JSON array of \
                         3 to 6 short bullet strings capturing what happened in the deal \
                         conversation, and nothing else.",
                        &format!(
                            "Transcript:\n{}\n\nKnown deal facts:\n{}",
                            transcript, deal_facts
                        ),
                    )
                    .await?;
                let bullets = parse_summary_bullets(&raw);
                self.checkpoint(run_id, session_key, STEP_SUMMARY, &bullets)
                    .await?;
                bullets
            }
        };

        // Step: action items
        let action_items = match completed
            .get(STEP_ACTION_ITEMS)
            .and_then(|p| serde_json::from_str::<Vec<ActionItem>>(p).ok())
        {
            Some(items) => {
                info!("Run {} reusing checkpointed action items", run_id);
                items
            }
            None => {
                let raw = self
                    .generate_step(
                        STEP_ACTION_ITEMS,
                        "You extract action items from sales coaching calls. Respond with a \
                         JSON array of objects, each {\"owner\": \"Rep\" or \"Customer\", \
                         \"item\": \"<short action>\"}, and nothing else.",
                        &format!(
                            "Transcript:\n{}\n\nCall summary:\n{}",
                            transcript,
                            bullets.join("\n")
                        ),
                    )
                    .await?;
                let items = parse_action_items(&raw);
                self.checkpoint(run_id, session_key, STEP_ACTION_ITEMS, &items)
                    .await?;
                items
            }
        };

        // Step: follow-up email
        let email = match completed.get(STEP_EMAIL) {
            Some(payload) => {
                info!("Run {} reusing checkpointed email", run_id);
                payload.clone()
            }
            None => {
                let items_text = action_items
                    .iter()
                    .map(|a| format!("{:?}: {}", a.owner, a.item))
                    .collect::<Vec<_>>()
                    .join("\n");
                let raw = self
                    .generate_step(
                        STEP_EMAIL,
                        "You draft concise follow-up emails from a sales rep to their \
                         customer after a call. Respond with the email body as plain \
                         text, no subject line, no JSON.",
                        &format!(
                            "Transcript:\n{}\n\nCall summary:\n{}\n\nAction items:\n{}",
                            transcript,
                            bullets.join("\n"),
                            items_text
                        ),
                    )
                    .await?;
                let email = raw.trim().to_string();
                self.checkpoints
                    .record(run_id, session_key, STEP_EMAIL, &email)
                    .await?;
                email
            }
        };

        let report = FinalReport {
            summary_bullets: bullets,
            action_items,
            followup_email: email,
        };

        self.agent.save_final(session_key, report.clone()).await?;

        info!(
            "Finalization run {} complete for session {}",
            run_id, session_key
        );

        Ok(report)
    }

    /// One generation step under the retry policy
    async fn generate_step(
        &self,
        step: &'static str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, PipelineError> {
        let mut delay = self.retry.base_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.backend.generate(system_prompt, user_prompt).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        "Finalization step {} attempt {}/{} failed: {}",
                        step, attempt, self.retry.max_attempts, e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    return Err(PipelineError::StepExhausted {
                        step,
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }

    async fn checkpoint<T: serde::Serialize>(
        &self,
        run_id: &str,
        session_key: &str,
        step: &str,
        payload: &T,
    ) -> Result<(), PipelineError> {
        let encoded = serde_json::to_string(payload)
            .map_err(|e| PipelineError::Storage(anyhow::anyhow!(e)))?;
        self.checkpoints
            .record(run_id, session_key, step, &encoded)
            .await?;
        Ok(())
    }
}

/// Parse summary bullets from a step completion.
///
/// Expected shape is a JSON array of strings; anything else degrades to
/// treating the raw text as a single bullet (or no bullets for blank text)
/// rather than failing the run.
fn parse_summary_bullets(raw: &str) -> Vec<String> {
    if let Some(items) = extract_json_array(raw) {
        let bullets: Vec<String> = items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !bullets.is_empty() {
            return bullets;
        }
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

/// Parse action items from a step completion.
///
/// Entries without usable item text are skipped; an unrecognized owner
/// defaults to the rep, who can always re-delegate. An unparseable payload
/// degrades to no action items.
fn parse_action_items(raw: &str) -> Vec<ActionItem> {
    let Some(items) = extract_json_array(raw) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|entry| {
            let item = entry.get("item").and_then(Value::as_str)?.trim();
            if item.is_empty() {
                return None;
            }
            let owner = match entry.get("owner").and_then(Value::as_str) {
                Some(o) if o.eq_ignore_ascii_case("customer") => ActionOwner::Customer,
                _ => ActionOwner::Rep,
            };
            Some(ActionItem {
                owner,
                item: item.to_string(),
            })
        })
        .collect()
}

/// Extract the span from the first `[` to the last `]` and parse it
fn extract_json_array(raw: &str) -> Option<Vec<Value>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if start > end {
        return None;
    }
    serde_json::from_str::<Value>(&raw[start..=end])
        .ok()?
        .as_array()
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_summary_bullets_json() {
        let raw = "Here you go:\n[\"budget confirmed\", \"demo scheduled\"]";
        assert_eq!(
            parse_summary_bullets(raw),
            vec!["budget confirmed".to_string(), "demo scheduled".to_string()]
        );
    }

    #[test]
    fn test_parse_summary_bullets_fallback_to_raw_text() {
        assert_eq!(
            parse_summary_bullets("The call went well overall."),
            vec!["The call went well overall.".to_string()]
        );
        assert!(parse_summary_bullets("   ").is_empty());
    }

    #[test]
    fn test_parse_summary_bullets_drops_non_strings() {
        let raw = "[\"keep\", 42, null]";
        assert_eq!(parse_summary_bullets(raw), vec!["keep".to_string()]);
    }

    #[test]
    fn test_parse_action_items() {
        let raw = r#"[
            {"owner": "Rep", "item": "send pricing"},
            {"owner": "customer", "item": "loop in security"},
            {"owner": "Rep", "item": "   "},
            {"owner": "Rep"}
        ]"#;

        let items = parse_action_items(raw);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].owner, ActionOwner::Rep);
        assert_eq!(items[0].item, "send pricing");
        assert_eq!(items[1].owner, ActionOwner::Customer);
    }

    #[test]
    fn test_parse_action_items_unknown_owner_defaults_to_rep() {
        let raw = r#"[{"owner": "Manager", "item": "approve discount"}]"#;
        let items = parse_action_items(raw);
        assert_eq!(items[0].owner, ActionOwner::Rep);
    }

    #[test]
    fn test_parse_action_items_garbage_is_empty() {
        assert!(parse_action_items("no items here").is_empty());
        assert!(parse_action_items("{\"not\": \"an array\"}").is_empty());
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }
}
