//! Upstream events to generic AI-SDK stream parts.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::delta::{snapshot_delta, DeltaTracker};
use crate::types::{StreamEvent, ToolCallEvent};

const UNKNOWN_CALL_ID: &str = "unknown";
const UNKNOWN_TOOL_NAME: &str = "tool";

/// A streaming part in AI-SDK format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AiSdkStreamPart {
    TextDelta {
        #[serde(rename = "textDelta")]
        text_delta: String,
    },
    ToolCallStreamingStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    ToolCallDelta {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "argsTextDelta")]
        args_text_delta: String,
    },
    ToolInputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "inputText")]
        input_text: String,
    },
}

/// Stateful converter; one instance per conversation turn.
#[derive(Debug, Default)]
pub struct StreamToAiSdkParts {
    tracker: DeltaTracker,
    tool_args_by_id: HashMap<String, String>,
    started_tool_ids: HashSet<String>,
}

impl StreamToAiSdkParts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one event into zero or more parts.
    pub fn handle_event(&mut self, event: &StreamEvent) -> Vec<AiSdkStreamPart> {
        if let Some(text) = event.extract_text() {
            return text_part(self.tracker.next_text(&text));
        }
        if let Some(thinking) = event.extract_thinking() {
            return text_part(self.tracker.next_thinking(&thinking));
        }
        match event {
            StreamEvent::ToolCall(call) => self.handle_tool_call(call),
            _ => Vec::new(),
        }
    }

    fn handle_tool_call(&mut self, event: &ToolCallEvent) -> Vec<AiSdkStreamPart> {
        let tool_call_id = event.call_id().unwrap_or(UNKNOWN_CALL_ID).to_string();
        let mut tool_name = event.infer_tool_name();
        if tool_name.is_empty() {
            tool_name = UNKNOWN_TOOL_NAME.to_string();
        }
        let mut parts = Vec::new();

        if let Some(args) = event.args() {
            let args_text = args.to_string();
            let previous = self
                .tool_args_by_id
                .get(&tool_call_id)
                .map(String::as_str)
                .unwrap_or("");
            let delta = snapshot_delta(previous, &args_text).to_string();
            self.tool_args_by_id
                .insert(tool_call_id.clone(), args_text.clone());

            if self.started_tool_ids.insert(tool_call_id.clone()) {
                parts.push(AiSdkStreamPart::ToolCallStreamingStart {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                });
            }
            if !delta.is_empty() {
                parts.push(AiSdkStreamPart::ToolCallDelta {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    args_text_delta: delta,
                });
            }
        }

        if let Some(result) = event.result() {
            parts.push(AiSdkStreamPart::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input_text: result.to_string(),
            });
        }

        parts
    }
}

fn text_part(delta: String) -> Vec<AiSdkStreamPart> {
    if delta.is_empty() {
        Vec::new()
    } else {
        vec![AiSdkStreamPart::TextDelta { text_delta: delta }]
    }
}
