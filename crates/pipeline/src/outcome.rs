//! Action results.
//!
//! Every action produces exactly one [`ActionResult`]: a canonical
//! [`ActionOutcome`] plus the [`TokenUsage`] of the call that produced it.
//! Downstream code matches on the outcome instead of probing LLM-shaped
//! mappings for keys.
//!
//! The *document* form (`to_document`) is the mapping persisted as an artifact
//! and fed back to later prompts. It always carries `input_tokens` and
//! `output_tokens` at the top level.

use serde_json::{Map, Value};

use crate::{CrewForgeError, TokenCount, TokenUsage, UsageSource};

/// Document key holding input token counts.
pub const INPUT_TOKENS_KEY: &str = "input_tokens";
/// Document key holding output token counts.
pub const OUTPUT_TOKENS_KEY: &str = "output_tokens";
/// Optional document key naming the [`UsageSource`].
pub const USAGE_SOURCE_KEY: &str = "usage_source";
/// Key used to wrap non-mapping payloads.
pub const RESPONSE_KEY: &str = "response";

/// Canonical shape of an LLM-backed action's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The response parsed into a mapping.
    Structured(Map<String, Value>),
    /// The response was not structured; holds the trimmed text.
    Raw(String),
    /// The call failed; holds a human-readable reason.
    Failed(String),
}

impl ActionOutcome {
    /// Document form without usage fields.
    pub fn to_payload(&self) -> Map<String, Value> {
        match self {
            ActionOutcome::Structured(map) => map.clone(),
            ActionOutcome::Raw(text) => {
                let mut map = Map::new();
                map.insert(RESPONSE_KEY.to_string(), Value::String(text.clone()));
                map
            }
            ActionOutcome::Failed(reason) => {
                let mut map = Map::new();
                map.insert("error".to_string(), Value::String(reason.clone()));
                map.insert("status".to_string(), Value::String("failed".to_string()));
                map
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ActionOutcome::Failed(_))
    }
}

/// The immutable result of one action invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    outcome: ActionOutcome,
    usage: TokenUsage,
}

impl ActionResult {
    pub fn new(outcome: ActionOutcome, usage: TokenUsage) -> Self {
        Self { outcome, usage }
    }

    pub fn outcome(&self) -> &ActionOutcome {
        &self.outcome
    }

    pub fn usage(&self) -> &TokenUsage {
        &self.usage
    }

    /// The structured payload, if the outcome is [`ActionOutcome::Structured`].
    pub fn payload(&self) -> Option<&Map<String, Value>> {
        match &self.outcome {
            ActionOutcome::Structured(map) => Some(map),
            _ => None,
        }
    }

    /// A top-level payload field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload().and_then(|map| map.get(key))
    }

    /// A boolean payload field; anything but `true` (or `"true"`) reads as
    /// `false`.
    pub fn flag(&self, key: &str) -> bool {
        match self.field(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// A list payload field rendered as strings.
    ///
    /// String items are taken verbatim; other items are rendered as compact
    /// JSON. A single string value is treated as a one-item list.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.field(key).map(value_to_strings).unwrap_or_default()
    }

    /// The failure reason, if the outcome is [`ActionOutcome::Failed`].
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            ActionOutcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Document form: payload plus top-level `input_tokens`, `output_tokens`
    /// and `usage_source`, so fallback zeros stay distinguishable from
    /// reported ones.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = self.outcome.to_payload();
        doc.insert(
            INPUT_TOKENS_KEY.to_string(),
            Value::from(self.usage.input_tokens.as_u64()),
        );
        doc.insert(
            OUTPUT_TOKENS_KEY.to_string(),
            Value::from(self.usage.output_tokens.as_u64()),
        );
        if let Ok(source) = serde_json::to_value(self.usage.source) {
            doc.insert(USAGE_SOURCE_KEY.to_string(), source);
        }
        doc
    }

    /// Rebuilds a result from its document form.
    ///
    /// Fails with [`CrewForgeError::MissingTokenAccounting`] when either usage
    /// field is absent or not a non-negative integer; usage is never
    /// defaulted to zero.
    pub fn from_document(action: &str, mut doc: Map<String, Value>) -> Result<Self, CrewForgeError> {
        let missing = || CrewForgeError::MissingTokenAccounting {
            action: action.to_string(),
        };
        let input = doc
            .remove(INPUT_TOKENS_KEY)
            .and_then(|v| v.as_u64())
            .ok_or_else(missing)?;
        let output = doc
            .remove(OUTPUT_TOKENS_KEY)
            .and_then(|v| v.as_u64())
            .ok_or_else(missing)?;
        let source = doc
            .remove(USAGE_SOURCE_KEY)
            .and_then(|v| serde_json::from_value::<UsageSource>(v).ok())
            .unwrap_or(UsageSource::Reported);

        let usage = TokenUsage {
            input_tokens: TokenCount::new(input),
            output_tokens: TokenCount::new(output),
            source,
        };
        Ok(Self::new(outcome_from_payload(doc), usage))
    }
}

fn outcome_from_payload(mut doc: Map<String, Value>) -> ActionOutcome {
    let is_failure = doc.len() == 2
        && doc.get("status").and_then(Value::as_str) == Some("failed")
        && doc.get("error").map(Value::is_string).unwrap_or(false);
    if is_failure {
        if let Some(Value::String(reason)) = doc.remove("error") {
            return ActionOutcome::Failed(reason);
        }
    }
    if doc.len() == 1 {
        if let Some(Value::String(text)) = doc.get(RESPONSE_KEY) {
            return ActionOutcome::Raw(text.clone());
        }
    }
    ActionOutcome::Structured(doc)
}

/// Renders a JSON value as a list of strings (see [`ActionResult::string_list`]).
pub fn value_to_strings(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    }
}
