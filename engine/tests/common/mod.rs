//! Shared test fixtures: a deterministic scripted LLM backend.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use dealcoach_engine::llm::{LlmBackend, LlmError, Result};

/// Default completion shaped like a well-behaved coaching reply
pub const DEFAULT_COMPLETION: &str =
    "[REPLY]Focus on the value story.[/REPLY]\nFOLLOW_UP_1: What is their timeline?\nFOLLOW_UP_2: Who signs off?";

/// Replays a scripted sequence of results and records every call.
///
/// When the script runs dry, every further call returns the default
/// completion, so long conversations don't need exhaustive scripts.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<(String, String)>>,
    default_completion: String,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::with_default(DEFAULT_COMPLETION)
    }

    pub fn with_default(completion: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            default_completion: completion.into(),
        }
    }

    /// Queue a successful completion
    pub fn push_ok(&self, raw: impl Into<String>) {
        self.script.lock().unwrap().push_back(Ok(raw.into()));
    }

    /// Queue a failure
    pub fn push_err(&self, err: LlmError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    /// Every (system_prompt, user_prompt) pair seen so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));

        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.default_completion.clone()),
        }
    }
}
