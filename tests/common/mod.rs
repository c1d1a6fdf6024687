//! Shared test helpers: tool fixtures and a recording interception sink.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use agent_relay::error::Result;
use agent_relay::intercept::InterceptionSink;
use agent_relay::tools::{build_tool_schema_map, extract_allowed_tool_names, SchemaMap, ToolUpdate};
use agent_relay::types::{ChatCompletionChunk, OpenAiToolCall, ResponseMeta, ToolCallEvent};

/// Sink that records every side effect for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub updates: Mutex<Vec<ToolUpdate>>,
    pub results: Mutex<Vec<ChatCompletionChunk>>,
    pub intercepted: Mutex<Vec<OpenAiToolCall>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intercepted(&self) -> Vec<OpenAiToolCall> {
        self.intercepted.lock().unwrap().clone()
    }

    pub fn results(&self) -> Vec<ChatCompletionChunk> {
        self.results.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<ToolUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Content of every recorded result chunk, in order.
    pub fn result_contents(&self) -> Vec<String> {
        self.results()
            .iter()
            .filter_map(|chunk| chunk.delta().and_then(|d| d.content.clone()))
            .collect()
    }
}

#[async_trait]
impl InterceptionSink for RecordingSink {
    async fn on_tool_update(&self, update: ToolUpdate) -> Result<()> {
        self.updates.lock().unwrap().push(update);
        Ok(())
    }

    async fn on_tool_result(&self, chunk: ChatCompletionChunk) -> Result<()> {
        self.results.lock().unwrap().push(chunk);
        Ok(())
    }

    async fn on_intercepted_tool_call(&self, call: OpenAiToolCall) -> Result<()> {
        self.intercepted.lock().unwrap().push(call);
        Ok(())
    }
}

/// Tool declarations in the OpenAI request shape.
pub fn tool_declarations() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": "read",
                "parameters": {
                    "type": "object",
                    "properties": { "path": { "type": "string" }, "limit": { "type": "integer" } },
                    "required": ["path"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "write",
                "parameters": {
                    "type": "object",
                    "properties": { "path": { "type": "string" }, "content": { "type": "string" } },
                    "required": ["path", "content"],
                    "additionalProperties": false
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "edit",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "old_string": { "type": "string" },
                        "new_string": { "type": "string" }
                    },
                    "required": ["path", "old_string", "new_string"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": "todowrite",
                "parameters": {
                    "type": "object",
                    "properties": { "todos": { "type": "array" } },
                    "required": ["todos"]
                }
            }
        }),
        json!({
            "name": "bash",
            "parameters": {
                "type": "object",
                "properties": { "command": { "type": "string" } },
                "required": ["command"]
            }
        }),
    ]
}

pub fn schema_map() -> SchemaMap {
    build_tool_schema_map(&tool_declarations())
}

pub fn allowed_tools() -> HashSet<String> {
    extract_allowed_tool_names(&tool_declarations())
}

pub fn names(names: &[&str]) -> HashSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

pub fn meta() -> ResponseMeta {
    ResponseMeta {
        id: "chatcmpl-test".to_string(),
        created: 1_700_000_000,
        model: "relay-test".to_string(),
    }
}

pub fn tool_event(value: Value) -> ToolCallEvent {
    serde_json::from_value(value).expect("valid tool_call event")
}

/// A started `tool_call` event for `key` with `args`.
pub fn started(call_id: &str, key: &str, args: Value) -> ToolCallEvent {
    tool_event(json!({
        "type": "tool_call",
        "subtype": "started",
        "call_id": call_id,
        "tool_call": { key: { "args": args } }
    }))
}
