//! Tool-call events to ACP-style progress updates.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{ToolCallEvent, ToolCallPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Edit,
    Search,
    Execute,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolUpdateStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A file position touched by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLocation {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
}

impl ToolLocation {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(path) => Some(Self {
                path: path.clone(),
                line: None,
            }),
            Value::Object(_) => Some(Self {
                path: value.get("path")?.as_str()?.to_string(),
                line: value.get("line").and_then(Value::as_u64),
            }),
            _ => None,
        }
    }
}

/// Progress notification for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUpdate {
    pub session_id: String,
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ToolKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolUpdateStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<ToolLocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl ToolUpdate {
    fn bare(session_id: &str, tool_call_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            tool_call_id: tool_call_id.to_string(),
            title: None,
            kind: None,
            status: None,
            locations: Vec::new(),
            content: Vec::new(),
            raw_output: None,
            start_time: None,
            end_time: None,
        }
    }
}

/// Maps tool-call events onto [`ToolUpdate`]s.
///
/// Started events yield `pending` then `in_progress`; completed and failed
/// events yield a single terminal update carrying the result.
#[derive(Debug, Clone, Default)]
pub struct ToolMapper;

impl ToolMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn map_event(&self, event: &ToolCallEvent, session_id: &str) -> Vec<ToolUpdate> {
        let tool_call_id = event.call_id().unwrap_or("unknown");
        let (key, payload) = match event.entry() {
            Some((key, payload)) => (key.to_ascii_lowercase(), payload),
            None => (String::new(), &Value::Null),
        };
        let args = payload.get("args").unwrap_or(&Value::Null);
        let now = chrono::Utc::now().timestamp_millis();

        match event.phase() {
            ToolCallPhase::Completed | ToolCallPhase::Failed => {
                let result = payload.get("result").unwrap_or(&Value::Null);
                let mut update = ToolUpdate::bare(session_id, tool_call_id);
                update.title = Some(tool_title(&key, args));
                update.kind = Some(tool_kind(&key));
                update.end_time = Some(now);

                if let Some(error) = result.get("error").filter(|e| !e.is_null()) {
                    update.status = Some(ToolUpdateStatus::Failed);
                    update.raw_output = Some(match error {
                        Value::String(message) => message.clone(),
                        other => other.to_string(),
                    });
                } else {
                    let locations = result_locations(result);
                    update.status = Some(ToolUpdateStatus::Completed);
                    update.locations = if locations.is_empty() {
                        arg_locations(args)
                    } else {
                        locations
                    };
                    update.content = result_content(&key, args, result);
                    update.raw_output = Some(result.to_string());
                }
                vec![update]
            }
            _ => {
                let mut pending = ToolUpdate::bare(session_id, tool_call_id);
                pending.title = Some(tool_title(&key, args));
                pending.kind = Some(tool_kind(&key));
                pending.status = Some(ToolUpdateStatus::Pending);
                pending.locations = arg_locations(args);
                pending.start_time = Some(now);

                let mut running = ToolUpdate::bare(session_id, tool_call_id);
                running.status = Some(ToolUpdateStatus::InProgress);
                vec![pending, running]
            }
        }
    }
}

fn tool_kind(key: &str) -> ToolKind {
    if key.contains("read") {
        ToolKind::Read
    } else if key.contains("write") || key.contains("edit") {
        ToolKind::Edit
    } else if key.contains("grep") || key.contains("glob") {
        ToolKind::Search
    } else if key.contains("bash") || key.contains("shell") {
        ToolKind::Execute
    } else {
        ToolKind::Other
    }
}

fn tool_title(key: &str, args: &Value) -> String {
    let arg = |name: &str| args.get(name).and_then(Value::as_str);

    if key.contains("read") {
        if let Some(path) = arg("path") {
            return format!("Read {path}");
        }
    }
    if key.contains("write") || key.contains("edit") {
        if let Some(path) = arg("path") {
            return format!("Write {path}");
        }
    }
    if key.contains("grep") {
        let pattern = arg("pattern").unwrap_or("pattern");
        return match arg("path") {
            Some(path) => format!("Search {path} for {pattern}"),
            None => format!("Search for {pattern}"),
        };
    }
    if key.contains("glob") {
        if let Some(pattern) = arg("pattern") {
            return format!("Glob {pattern}");
        }
    }
    if key.contains("bash") || key.contains("shell") {
        if let Some(command) = arg("command").or_else(|| arg("cmd")) {
            return format!("`{command}`");
        }
        if let Some(commands) = args.get("commands").and_then(Value::as_array) {
            let joined: Vec<&str> = commands.iter().filter_map(Value::as_str).collect();
            return format!("`{}`", joined.join(" && "));
        }
    }
    "other".to_string()
}

fn arg_locations(args: &Value) -> Vec<ToolLocation> {
    match args.get("path") {
        Some(Value::String(path)) => {
            return vec![ToolLocation {
                path: path.clone(),
                line: args.get("line").and_then(Value::as_u64),
            }]
        }
        Some(Value::Array(paths)) => {
            return paths.iter().filter_map(ToolLocation::from_value).collect();
        }
        _ => {}
    }
    args.get("paths")
        .and_then(Value::as_array)
        .map(|paths| paths.iter().filter_map(ToolLocation::from_value).collect())
        .unwrap_or_default()
}

fn result_locations(result: &Value) -> Vec<ToolLocation> {
    let mut locations = Vec::new();
    if let Some(matches) = result.get("matches").and_then(Value::as_array) {
        locations.extend(matches.iter().filter_map(ToolLocation::from_value));
    }
    if let Some(files) = result.get("files").and_then(Value::as_array) {
        locations.extend(files.iter().filter_map(ToolLocation::from_value));
    }
    if let Some(path) = result.get("path").and_then(Value::as_str) {
        locations.push(ToolLocation {
            path: path.to_string(),
            line: result.get("line").and_then(Value::as_u64),
        });
    }
    locations
}

fn result_content(key: &str, args: &Value, result: &Value) -> Vec<Value> {
    let mut content = Vec::new();

    if key.contains("write") {
        let old_text = result.get("oldText");
        let new_text = result.get("newText");
        if old_text.is_some() || new_text.is_some() {
            let path = args
                .get("path")
                .or_else(|| result.get("path"))
                .cloned()
                .unwrap_or(Value::Null);
            content.push(json!({
                "type": "diff",
                "path": path,
                "oldText": old_text.cloned().unwrap_or(Value::Null),
                "newText": new_text.cloned().unwrap_or(Value::Null),
            }));
        }
    }

    if let Some(text) = result.get("content").and_then(Value::as_str) {
        content.push(json!({ "type": "content", "content": { "text": text } }));
    }

    if result.get("output").is_some() || result.get("exitCode").is_some() {
        let exit_code = result.get("exitCode").and_then(Value::as_i64).unwrap_or(0);
        let output = result
            .get("output")
            .and_then(Value::as_str)
            .filter(|o| !o.is_empty())
            .unwrap_or("(no output)");
        content.push(json!({
            "type": "content",
            "content": { "text": format!("Exit code: {exit_code}\n{output}") }
        }));
    }

    content
}
