//! Prompt Builders
//!
//! Everything the engine knows about the generative backend's behavior is
//! encoded here: the coaching persona and guardrails, the strict output
//! formats the parsers rely on, and the rendering of session state into
//! prompt text.

use super::deal_memory::DealMemory;
use super::state::Message;

/// How many recent messages are rendered into the per-turn context
pub const CONTEXT_WINDOW: usize = 10;

/// Fixed refusal sentence the coaching prompt instructs the model to use
pub const REFUSAL_SENTENCE: &str =
    "I can only coach you on the sales conversation itself, so let's keep it to the deal at hand.";

/// System prompt for the per-turn coaching call
pub fn coaching_system_prompt() -> String {
    format!(
        "You are a sharp, practical sales objection coach. The user is a sales rep \
        describing a live deal; coach them on handling objections, qualifying, and \
        moving the deal forward. Be concrete and brief.\n\n\
        Guardrails: if the user asks for regulated financial, legal, or compliance \
        advice, or anything unrelated to their sales conversation, reply with exactly \
        this sentence and nothing else: \"{refusal}\"\n\n\
        Output format, exactly:\n\
        [REPLY]\n\
        <your coaching reply>\n\
        [/REPLY]\n\
        FOLLOW_UP_1: <a short probing question for the rep>\n\
        FOLLOW_UP_2: <a second short probing question>",
        refusal = REFUSAL_SENTENCE
    )
}

/// User prompt for the per-turn coaching call
pub fn coaching_user_prompt(
    rolling_summary: &str,
    deal_memory: &DealMemory,
    recent_context: &str,
) -> String {
    format!(
        "Conversation summary so far:\n{summary}\n\n\
        Known deal facts:\n{memory}\n\n\
        Recent conversation:\n{context}\n\n\
        Coach the rep on their latest message.",
        summary = if rolling_summary.trim().is_empty() {
            "(none yet)"
        } else {
            rolling_summary
        },
        memory = render_deal_memory(deal_memory),
        context = recent_context,
    )
}

/// System prompt for the periodic memory-consolidation call
pub fn extraction_system_prompt() -> String {
    "You extract structured sales-deal facts from a coaching conversation. \
    Respond with a single JSON object and nothing else, wrapped between \
    [MEMORY] and [/MEMORY] tags. Keys: \"customerName\", \"company\", \
    \"industry\", \"budget\", \"timeline\" (strings), \"painPoints\", \
    \"objections\", \"nextSteps\" (arrays of short strings), and \
    \"rollingSummary\" (a 2-4 sentence summary of the whole conversation). \
    Leave a string empty and an array empty only when the conversation truly \
    contains nothing for it."
        .to_string()
}

/// User prompt for the periodic memory-consolidation call
pub fn extraction_user_prompt(
    rolling_summary: &str,
    deal_memory: &DealMemory,
    recent_context: &str,
) -> String {
    format!(
        "Previous summary:\n{summary}\n\n\
        Previously extracted facts:\n{memory}\n\n\
        Recent conversation:\n{context}\n\n\
        Update the facts and the summary.",
        summary = if rolling_summary.trim().is_empty() {
            "(none yet)"
        } else {
            rolling_summary
        },
        memory = render_deal_memory(deal_memory),
        context = recent_context,
    )
}

/// Render the last `CONTEXT_WINDOW` messages as `ROLE: content` lines
pub fn render_recent_context(messages: &[Message]) -> String {
    render_transcript(tail(messages, CONTEXT_WINDOW))
}

/// Render a slice of messages as `ROLE: content` lines
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_deal_memory(memory: &DealMemory) -> String {
    if memory.is_empty() {
        return "(nothing extracted yet)".to_string();
    }
    // Pretty JSON keeps the keys aligned with what extraction produces.
    serde_json::to_string_pretty(memory).unwrap_or_else(|_| "(unrenderable)".to_string())
}

fn tail(messages: &[Message], n: usize) -> &[Message] {
    &messages[messages.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_context_caps_at_window() {
        let messages: Vec<Message> = (0..25)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("u{}", i))
                } else {
                    Message::assistant(format!("a{}", i))
                }
            })
            .collect();

        let context = render_recent_context(&messages);
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines.len(), CONTEXT_WINDOW);
        // Most recent message is last, in original order.
        assert_eq!(lines[CONTEXT_WINDOW - 1], "USER: u24");
        assert_eq!(lines[0], "ASSISTANT: a15");
    }

    #[test]
    fn test_context_renders_role_prefixes() {
        let messages = vec![Message::user("hello"), Message::assistant("hi")];
        assert_eq!(render_recent_context(&messages), "USER: hello\nASSISTANT: hi");
    }

    #[test]
    fn test_coaching_prompts_embed_state() {
        let mut memory = DealMemory::default();
        memory.budget = "80k".to_string();

        let prompt = coaching_user_prompt("they want SSO", &memory, "USER: hi");
        assert!(prompt.contains("they want SSO"));
        assert!(prompt.contains("80k"));
        assert!(prompt.contains("USER: hi"));
    }

    #[test]
    fn test_empty_state_renders_placeholders() {
        let prompt = coaching_user_prompt("", &DealMemory::default(), "");
        assert!(prompt.contains("(none yet)"));
        assert!(prompt.contains("(nothing extracted yet)"));
    }

    #[test]
    fn test_system_prompts_carry_format_contract() {
        let coaching = coaching_system_prompt();
        assert!(coaching.contains("[REPLY]"));
        assert!(coaching.contains("[/REPLY]"));
        assert!(coaching.contains("FOLLOW_UP_1:"));
        assert!(coaching.contains(REFUSAL_SENTENCE));

        let extraction = extraction_system_prompt();
        assert!(extraction.contains("[MEMORY]"));
        assert!(extraction.contains("rollingSummary"));
    }
}
