//! Tool-call extraction and name resolution.
//!
//! Upstream tool calls arrive in several shapes: `args` wrapped or flat,
//! PascalCase `...ToolCall` keys, string-encoded arguments. Everything is
//! decoded into one [`ToolCallCandidate`] and then resolved against the
//! caller's declared tool names.

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use crate::types::{normalize_tool_key, OpenAiToolCall, ToolCallEvent};

/// Id used when the upstream event carries none.
pub const UNKNOWN_CALL_ID: &str = "call_unknown";

/// Upstream tool names that map onto a canonical declared tool.
/// Keys are already in [`normalize_alias_key`] form.
const TOOL_NAME_ALIASES: &[(&str, &str)] = &[
    ("updatetodos", "todowrite"),
    ("updatetodostoolcall", "todowrite"),
    ("todowrite", "todowrite"),
    ("todowritetoolcall", "todowrite"),
    ("writetodos", "todowrite"),
    ("todowritefn", "todowrite"),
    ("readtodos", "todoread"),
    ("readtodostoolcall", "todoread"),
    ("todoread", "todoread"),
    ("todoreadtoolcall", "todoread"),
];

/// A tool call decoded from one upstream event, before name resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallCandidate {
    pub id: String,
    pub raw_name: String,
    pub args: Option<Value>,
    /// Re-broadcast carrying only a `result`; never emitted as a call.
    pub is_result_only: bool,
}

impl ToolCallCandidate {
    /// Lenient decode: first mapping key, any payload shape.
    ///
    /// Returns `None` when no tool name can be determined.
    pub fn from_event(event: &ToolCallEvent) -> Option<Self> {
        let entry = event.entry();
        let raw_name = event
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(entry.map(|(key, _)| key))
            .map(normalize_tool_key)
            .filter(|name| !name.is_empty())?;

        let (args, is_result_only) = match entry {
            Some((_, Value::Object(payload))) => payload_args(payload),
            _ => (None, false),
        };

        Some(Self {
            id: event.call_id().unwrap_or(UNKNOWN_CALL_ID).to_string(),
            raw_name,
            args,
            is_result_only,
        })
    }

    /// Resolve against `allowed` and serialize into an OpenAI tool call.
    pub fn into_tool_call(self, allowed: &HashSet<String>) -> Option<OpenAiToolCall> {
        if self.is_result_only {
            tracing::trace!(tool = %self.raw_name, "skipping result-only tool call event");
            return None;
        }
        let Some(name) = resolve_allowed_tool_name(&self.raw_name, allowed) else {
            tracing::debug!(tool = %self.raw_name, "tool call does not match a declared tool");
            return None;
        };
        let arguments = to_openai_arguments(self.args.as_ref());
        Some(OpenAiToolCall::new(self.id, name, arguments))
    }
}

/// Arguments of an object payload, and whether it is a result-only re-emission.
pub(crate) fn payload_args(payload: &Map<String, Value>) -> (Option<Value>, bool) {
    if let Some(args) = payload.get("args") {
        return (Some(args.clone()), false);
    }
    let rest: Map<String, Value> = payload
        .iter()
        .filter(|(key, _)| key.as_str() != "result")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if rest.is_empty() {
        return (None, true);
    }
    (Some(Value::Object(rest)), false)
}

/// Extract an OpenAI tool call from `event` if it names a declared tool.
pub fn extract_tool_call(
    event: &ToolCallEvent,
    allowed: &HashSet<String>,
) -> Option<OpenAiToolCall> {
    if allowed.is_empty() {
        return None;
    }
    ToolCallCandidate::from_event(event)?.into_tool_call(allowed)
}

/// Match `name` to a declared tool: exact, then insensitive, then via alias.
pub fn resolve_allowed_tool_name(name: &str, allowed: &HashSet<String>) -> Option<String> {
    if allowed.contains(name) {
        return Some(name.to_string());
    }

    let normalized = normalize_alias_key(name);
    if let Some(found) = find_insensitive(&normalized, allowed) {
        return Some(found);
    }

    let canonical = TOOL_NAME_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| *canonical)?;
    find_insensitive(&normalize_alias_key(canonical), allowed)
}

fn find_insensitive(normalized: &str, allowed: &HashSet<String>) -> Option<String> {
    allowed
        .iter()
        .filter(|candidate| normalize_alias_key(candidate) == normalized)
        .min()
        .cloned()
}

/// Lower-case and keep only ASCII alphanumerics.
pub fn normalize_alias_key(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Serialize arguments for the `function.arguments` field.
///
/// Objects and arrays pass through; JSON-encoded strings are decoded first;
/// anything else is wrapped as `{"value": ...}`. Absent arguments become `{}`.
pub fn to_openai_arguments(args: Option<&Value>) -> String {
    let value = match args {
        None => return "{}".to_string(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
            Ok(parsed) => json!({ "value": parsed }),
            Err(_) => json!({ "value": raw }),
        },
        Some(value @ (Value::Object(_) | Value::Array(_))) => value.clone(),
        Some(other) => json!({ "value": other }),
    };
    value.to_string()
}
