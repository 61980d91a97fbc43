//! Reply Parser
//!
//! Pure extraction of a coaching reply and up to two follow-up questions
//! from a tagged free-text completion. Models are inconsistent about
//! honoring output formats, so every missing piece has a deterministic
//! fallback; identical input always produces identical output.

use regex::Regex;
use std::sync::OnceLock;

/// Opening reply delimiter the coaching prompt instructs the model to emit
pub const REPLY_OPEN: &str = "[REPLY]";

/// Closing reply delimiter
pub const REPLY_CLOSE: &str = "[/REPLY]";

/// Reply used when the completion contains no usable text
pub const EMPTY_REPLY_FALLBACK: &str =
    "Could you tell me a bit more about the deal so I can coach you on it?";

/// Probing questions used when the model emitted no follow-up lines
pub const DEFAULT_FOLLOW_UPS: [&str; 2] = [
    "What objections are you expecting on this deal?",
    "Who else is involved in the buying decision?",
];

/// Maximum number of follow-up questions returned
const MAX_FOLLOW_UPS: usize = 2;

/// Parsed result of one coaching completion
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub reply: String,
    pub follow_ups: Vec<String>,
}

fn follow_up_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*FOLLOW_UP_[12]:\s*(.*\S)\s*$").expect("valid follow-up regex")
    })
}

/// Parse a raw completion into a reply and at most two follow-up questions.
///
/// Reply extraction: both tags present takes the enclosed text; only the
/// close tag present takes everything before it; no tags takes the whole
/// text. Residual tags are stripped afterwards, and an empty reply falls
/// back to a fixed prompt-for-more-detail sentence. Follow-ups come from
/// `FOLLOW_UP_1:` / `FOLLOW_UP_2:` lines; zero found substitutes two fixed
/// probing questions.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let body = match (raw.find(REPLY_OPEN), raw.find(REPLY_CLOSE)) {
        (Some(open), Some(close)) if open + REPLY_OPEN.len() <= close => {
            &raw[open + REPLY_OPEN.len()..close]
        }
        (_, Some(close)) => &raw[..close],
        _ => raw,
    };

    // Stripping can splice two half-tags into a whole one, so repeat
    // until nothing changes.
    let mut reply = body.to_string();
    loop {
        let stripped = reply.replace(REPLY_OPEN, "").replace(REPLY_CLOSE, "");
        if stripped == reply {
            break;
        }
        reply = stripped;
    }
    let reply = reply.trim().to_string();

    let reply = if reply.is_empty() {
        EMPTY_REPLY_FALLBACK.to_string()
    } else {
        reply
    };

    let mut follow_ups: Vec<String> = follow_up_re()
        .captures_iter(raw)
        .take(MAX_FOLLOW_UPS)
        .map(|c| c[1].trim().to_string())
        .collect();

    if follow_ups.is_empty() {
        follow_ups = DEFAULT_FOLLOW_UPS.iter().map(|s| s.to_string()).collect();
    }

    ParsedReply { reply, follow_ups }
}
