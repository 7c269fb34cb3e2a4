//! Response normalisation.
//!
//! Turns whatever an LLM returned into an [`ActionOutcome`] without ever
//! failing: fenced blocks are unwrapped, JSON is parsed strictly, and anything
//! that still does not parse becomes [`ActionOutcome::Raw`].
//!
//! Resolution order for text input:
//!
//! 1. the first fenced block whose opener carries a language tag
//!    (e.g. ```` ```json ````), else the first untagged fenced block;
//! 2. otherwise the whole trimmed text;
//! 3. if that is not JSON and no fence was present, the outermost `{ … }`
//!    slice of the text.

use serde_json::{Map, Value};

use crate::outcome::RESPONSE_KEY;
use crate::ActionOutcome;

const FENCE: &str = "```";

/// Normalises completion text.
pub fn normalize_text(text: &str) -> ActionOutcome {
    let fenced = extract_fenced_block(text);
    let candidate = fenced.unwrap_or(text).trim();

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return structured(value);
    }
    if fenced.is_none() {
        if let Some(slice) = outer_object_slice(candidate) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(slice) {
                return structured(value);
            }
        }
    }
    ActionOutcome::Raw(text.trim().to_string())
}

/// Normalises a value that may already be structured.
///
/// Mappings are returned unchanged (a `"response"` key inside is left alone),
/// strings go through [`normalize_text`], and every other value is wrapped as
/// `{"response": value}`.
pub fn normalize_value(value: Value) -> ActionOutcome {
    match value {
        Value::String(text) => normalize_text(&text),
        other => structured(other),
    }
}

/// Lifts a lone `"response"` wrapper so callers that expect named fields see
/// them at the top level.
///
/// `{"response": {...}}` becomes the inner mapping; `{"response": "<text>"}`
/// is normalised again, which recovers JSON that an LLM returned as a quoted
/// string. Any other outcome is returned unchanged.
pub fn lift_response(outcome: ActionOutcome) -> ActionOutcome {
    let ActionOutcome::Structured(mut map) = outcome else {
        return outcome;
    };
    if map.len() != 1 || !map.contains_key(RESPONSE_KEY) {
        return ActionOutcome::Structured(map);
    }
    match map.remove(RESPONSE_KEY) {
        Some(Value::Object(inner)) => ActionOutcome::Structured(inner),
        Some(Value::String(text)) => match normalize_text(&text) {
            ActionOutcome::Raw(_) => ActionOutcome::Raw(text.trim().to_string()),
            lifted => lifted,
        },
        Some(other) => ActionOutcome::Structured(wrap_response(other)),
        None => ActionOutcome::Structured(map),
    }
}

/// Extracts the content of the preferred fenced block, if the text has any.
pub fn extract_fenced_block(text: &str) -> Option<&str> {
    let mut first_untagged: Option<&str> = None;
    let mut offset = 0;

    while let Some(relative) = text[offset..].find(FENCE) {
        let open = offset + relative + FENCE.len();
        let after = &text[open..];
        let close = after.find(FENCE);
        let block = match close {
            Some(end) => &after[..end],
            None => after,
        };

        let (tag, body) = match block.find('\n') {
            Some(newline) => (block[..newline].trim(), &block[newline + 1..]),
            None => ("", block),
        };
        if is_language_tag(tag) {
            return Some(body.trim());
        }
        if first_untagged.is_none() {
            let content = if tag.is_empty() { body } else { block };
            first_untagged = Some(content.trim());
        }

        match close {
            Some(end) => offset = open + end + FENCE.len(),
            None => break,
        }
    }
    first_untagged
}

fn is_language_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

fn outer_object_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn structured(value: Value) -> ActionOutcome {
    match value {
        Value::Object(map) => ActionOutcome::Structured(map),
        other => ActionOutcome::Structured(wrap_response(other)),
    }
}

fn wrap_response(value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(RESPONSE_KEY.to_string(), value);
    map
}
