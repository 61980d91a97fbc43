//! Deal Memory and Merge Policy
//!
//! Structured facts about the sales opportunity, extracted periodically from
//! the conversation. The merge policy never discards known-good data: a
//! scalar is only overwritten by a fresh non-empty value, and a list is only
//! replaced by a well-formed extracted list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured record of the best-known facts about the deal
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DealMemory {
    pub customer_name: String,
    pub company: String,
    pub industry: String,
    pub budget: String,
    pub timeline: String,
    pub pain_points: Vec<String>,
    pub objections: Vec<String>,
    pub next_steps: Vec<String>,
}

impl DealMemory {
    /// Merge freshly extracted facts into this memory.
    ///
    /// Scalar fields: the extracted value wins only if it is a non-empty
    /// string. List fields: any well-formed array of strings wins, including
    /// an empty one (an explicit `[]` means the model now believes there are
    /// zero items). Anything else, including a non-object `extracted`, leaves
    /// the current value in place. This never fails.
    pub fn merged(&self, extracted: &Value) -> DealMemory {
        DealMemory {
            customer_name: merge_scalar(&self.customer_name, extracted.get("customerName")),
            company: merge_scalar(&self.company, extracted.get("company")),
            industry: merge_scalar(&self.industry, extracted.get("industry")),
            budget: merge_scalar(&self.budget, extracted.get("budget")),
            timeline: merge_scalar(&self.timeline, extracted.get("timeline")),
            pain_points: merge_list(&self.pain_points, extracted.get("painPoints")),
            objections: merge_list(&self.objections, extracted.get("objections")),
            next_steps: merge_list(&self.next_steps, extracted.get("nextSteps")),
        }
    }

    /// True when nothing has been extracted yet
    pub fn is_empty(&self) -> bool {
        *self == DealMemory::default()
    }
}

/// Scalar rule: extracted non-empty string wins, else keep current.
pub fn merge_scalar(current: &str, extracted: Option<&Value>) -> String {
    match extracted.and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => current.to_string(),
    }
}

/// List rule: a well-formed array wins even when empty; non-string entries
/// are dropped rather than failing the whole list.
pub fn merge_list(current: &[String], extracted: Option<&Value>) -> Vec<String> {
    match extracted.and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => current.to_vec(),
    }
}

/// Pull the extraction JSON out of a raw consolidation completion.
///
/// The extraction prompt asks for the JSON wrapped in `[MEMORY]` /
/// `[/MEMORY]` tags. When the tags are missing, fall back to the span from
/// the first `{` to the last `}`. Returns `None` when no parseable object is
/// found; callers absorb that silently.
pub fn extract_memory_json(raw: &str) -> Option<Value> {
    let candidate = match (raw.find("[MEMORY]"), raw.find("[/MEMORY]")) {
        (Some(open), Some(close)) if open + "[MEMORY]".len() <= close => {
            &raw[open + "[MEMORY]".len()..close]
        }
        _ => {
            let start = raw.find('{')?;
            let end = raw.rfind('}')?;
            if start > end {
                return None;
            }
            &raw[start..=end]
        }
    };

    let value: Value = serde_json::from_str(candidate.trim()).ok()?;
    value.is_object().then_some(value)
}
