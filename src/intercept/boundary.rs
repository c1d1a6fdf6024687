//! Versioned tool-call boundaries.
//!
//! A boundary decodes one upstream payload-shape generation into a
//! [`ToolCallCandidate`]. `v1` is strict and reports shape defects as
//! [`BoundaryError`]; `legacy` is the lenient decoder `v1` falls back to.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::BoundaryError;
use crate::tools::extract::payload_args;
use crate::tools::validation::json_type_name;
use crate::tools::{ToolCallCandidate, UNKNOWN_CALL_ID};
use crate::types::{normalize_tool_key, OpenAiToolCall, ToolCallEvent};

/// Which boundary generation to use.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BoundaryMode {
    #[default]
    V1,
    Legacy,
}

/// Extraction strategy for one payload-shape generation.
pub trait ToolCallBoundary: Send + Sync + Debug {
    fn mode(&self) -> BoundaryMode;

    /// Decode `event` into a candidate; `Ok(None)` when it names no tool.
    fn extract_candidate(
        &self,
        event: &ToolCallEvent,
    ) -> Result<Option<ToolCallCandidate>, BoundaryError>;

    /// Decode and resolve `event` against `allowed`.
    fn maybe_extract_tool_call(
        &self,
        event: &ToolCallEvent,
        allowed: &HashSet<String>,
    ) -> Result<Option<OpenAiToolCall>, BoundaryError> {
        if allowed.is_empty() {
            return Ok(None);
        }
        Ok(self
            .extract_candidate(event)?
            .and_then(|candidate| candidate.into_tool_call(allowed)))
    }
}

/// Strict decoder for the current upstream shape.
#[derive(Debug, Clone)]
pub struct V1Boundary {
    provider_id: String,
}

impl V1Boundary {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }
}

impl ToolCallBoundary for V1Boundary {
    fn mode(&self) -> BoundaryMode {
        BoundaryMode::V1
    }

    fn extract_candidate(
        &self,
        event: &ToolCallEvent,
    ) -> Result<Option<ToolCallCandidate>, BoundaryError> {
        if event.tool_call.len() > 1 {
            let keys: Vec<&str> = event.tool_call.keys().collect();
            return Err(BoundaryError::AmbiguousToolKey {
                count: keys.len(),
                keys: keys.join(", "),
            });
        }

        let entry = event.entry();
        let explicit = event.name.as_deref().filter(|name| !name.trim().is_empty());
        let Some(raw_name) = explicit
            .or(entry.map(|(key, _)| key))
            .map(normalize_tool_key)
            .filter(|name| !name.is_empty())
        else {
            return Ok(None);
        };

        let (args, is_result_only) = match entry.map(|(_, payload)| payload) {
            Some(Value::Object(payload)) => payload_args(payload),
            Some(Value::Null) | None => (None, false),
            Some(other) => {
                return Err(BoundaryError::UnsupportedPayload {
                    tool: raw_name,
                    kind: json_type_name(other),
                })
            }
        };

        tracing::trace!(provider = %self.provider_id, tool = %raw_name, "v1 boundary decoded tool call");
        Ok(Some(ToolCallCandidate {
            id: event.call_id().unwrap_or(UNKNOWN_CALL_ID).to_string(),
            raw_name,
            args: args.map(decode_string_args),
            is_result_only,
        }))
    }
}

/// String-encoded JSON objects and arrays become structured arguments.
fn decode_string_args(args: Value) -> Value {
    if let Value::String(raw) = &args {
        if let Ok(parsed @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str(raw) {
            return parsed;
        }
    }
    args
}

/// Lenient decoder: first mapping key, any payload.
#[derive(Debug, Clone)]
pub struct LegacyBoundary {
    provider_id: String,
}

impl LegacyBoundary {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }
}

impl ToolCallBoundary for LegacyBoundary {
    fn mode(&self) -> BoundaryMode {
        BoundaryMode::Legacy
    }

    fn extract_candidate(
        &self,
        event: &ToolCallEvent,
    ) -> Result<Option<ToolCallCandidate>, BoundaryError> {
        let candidate = ToolCallCandidate::from_event(event);
        if let Some(candidate) = &candidate {
            tracing::trace!(provider = %self.provider_id, tool = %candidate.raw_name, "legacy boundary decoded tool call");
        }
        Ok(candidate)
    }
}

/// Boundary implementation for `mode`.
pub fn create_boundary(mode: BoundaryMode, provider_id: &str) -> Arc<dyn ToolCallBoundary> {
    match mode {
        BoundaryMode::V1 => Arc::new(V1Boundary::new(provider_id)),
        BoundaryMode::Legacy => Arc::new(LegacyBoundary::new(provider_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tool_event(value: Value) -> ToolCallEvent {
        serde_json::from_value(value).unwrap()
    }

    fn allowed(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn v1_rejects_multi_key_mappings() {
        let event = tool_event(json!({
            "tool_call": { "readToolCall": { "args": {} }, "editToolCall": { "args": {} } }
        }));

        let err = V1Boundary::new("cursor-acp")
            .maybe_extract_tool_call(&event, &allowed(&["read", "edit"]))
            .unwrap_err();

        assert!(matches!(err, BoundaryError::AmbiguousToolKey { count: 2, .. }));
    }

    #[test]
    fn v1_rejects_scalar_payloads_that_legacy_accepts() {
        let event = tool_event(json!({ "call_id": "c1", "tool_call": { "readToolCall": "foo.txt" } }));
        let names = allowed(&["read"]);

        let err = V1Boundary::new("cursor-acp")
            .maybe_extract_tool_call(&event, &names)
            .unwrap_err();
        assert_eq!(
            err,
            BoundaryError::UnsupportedPayload {
                tool: "read".into(),
                kind: "string"
            }
        );

        let call = LegacyBoundary::new("cursor-acp")
            .maybe_extract_tool_call(&event, &names)
            .unwrap()
            .unwrap();
        assert_eq!(call.function.arguments, "{}");
    }

    #[test]
    fn v1_decodes_string_encoded_args() {
        let event = tool_event(json!({
            "call_id": "c1",
            "tool_call": { "readToolCall": { "args": "{\"path\":\"a.txt\"}" } }
        }));

        let candidate = V1Boundary::new("cursor-acp")
            .extract_candidate(&event)
            .unwrap()
            .unwrap();

        assert_eq!(candidate.args, Some(json!({ "path": "a.txt" })));
    }

    #[test]
    fn boundaries_agree_on_well_formed_events() {
        let event = tool_event(json!({
            "call_id": "c1",
            "tool_call": { "readToolCall": { "args": { "path": "foo.txt" } } }
        }));
        let names = allowed(&["read"]);

        let v1 = create_boundary(BoundaryMode::V1, "cursor-acp")
            .maybe_extract_tool_call(&event, &names)
            .unwrap();
        let legacy = create_boundary(BoundaryMode::Legacy, "cursor-acp")
            .maybe_extract_tool_call(&event, &names)
            .unwrap();

        assert_eq!(v1, legacy);
        assert_eq!(v1.unwrap().function.arguments, r#"{"path":"foo.txt"}"#);
    }

    #[test]
    fn boundary_mode_parses_case_insensitively() {
        assert_eq!("V1".parse::<BoundaryMode>().unwrap(), BoundaryMode::V1);
        assert_eq!("legacy".parse::<BoundaryMode>().unwrap(), BoundaryMode::Legacy);
        assert!("v2".parse::<BoundaryMode>().is_err());
    }
}
