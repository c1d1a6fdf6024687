//! Upstream agent stream events (one JSON object per NDJSON line).

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

const TOOL_CALL_SUFFIX: &str = "ToolCall";

/// A single event emitted by the upstream agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    System(SystemEvent),
    User(MessageEvent),
    Assistant(MessageEvent),
    Thinking(MessageEvent),
    ToolCall(ToolCallEvent),
    Result(ResultEvent),
}

/// Session bootstrap information.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(
        default,
        rename = "permissionMode",
        skip_serializing_if = "Option::is_none"
    )]
    pub permission_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<SystemTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Tool advertised by the upstream agent at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// User, assistant, or thinking event carrying content blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: EventMessage,
}

/// Message body of a [`MessageEvent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A content block inside an event message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Unknown,
}

/// Lifecycle phase of a tool call event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallPhase {
    Started,
    Completed,
    Failed,
    #[serde(other)]
    Other,
}

/// Tool call event: a single-key mapping from the raw tool key to its payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<ToolCallPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Explicit tool name; overrides the mapping key when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_call: ToolCallMap,
}

/// Raw tool keys with their payloads, in upstream order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallMap(Vec<(String, Value)>);

impl ToolCallMap {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, payload)| (key.as_str(), payload))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, payload)| payload)
    }
}

impl FromIterator<(String, Value)> for ToolCallMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for ToolCallMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, payload) in &self.0 {
            map.serialize_entry(key, payload)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ToolCallMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = ToolCallMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of tool keys to payloads")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, Value)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, payload)) = access.next_entry::<String, Value>()? {
                    match entries.iter_mut().find(|entry| entry.0 == key) {
                        Some(entry) => entry.1 = payload,
                        None => entries.push((key, payload)),
                    }
                }
                Ok(ToolCallMap(entries))
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(ToolCallMap::default())
            }
        }

        deserializer.deserialize_any(EntriesVisitor)
    }
}

impl ToolCallEvent {
    /// Upstream call id (`call_id`, then `tool_call_id`).
    pub fn call_id(&self) -> Option<&str> {
        self.call_id
            .as_deref()
            .or(self.tool_call_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Phase of this event; absent subtype means `started`.
    pub fn phase(&self) -> ToolCallPhase {
        self.subtype.unwrap_or(ToolCallPhase::Started)
    }

    /// First raw tool key with its payload.
    pub fn entry(&self) -> Option<(&str, &Value)> {
        self.tool_call.iter().next()
    }

    /// Canonical tool name derived from the mapping key.
    pub fn infer_tool_name(&self) -> String {
        self.entry()
            .map(|(key, _)| normalize_tool_key(key))
            .unwrap_or_default()
    }

    /// `args` object of the payload, if present.
    pub fn args(&self) -> Option<&Value> {
        self.entry()
            .and_then(|(_, payload)| payload.get("args"))
            .filter(|args| !args.is_null())
    }

    /// `result` object of the payload, if present.
    pub fn result(&self) -> Option<&Value> {
        self.entry()
            .and_then(|(_, payload)| payload.get("result"))
            .filter(|result| !result.is_null())
    }
}

/// Strip a PascalCase `ToolCall` suffix and lower-case the leading character.
///
/// `readToolCall` becomes `read`, `ReadFileToolCall` becomes `readFile`.
/// Keys without the suffix are returned unchanged.
pub fn normalize_tool_key(raw: &str) -> String {
    let Some(base) = raw.strip_suffix(TOOL_CALL_SUFFIX) else {
        return raw.to_string();
    };
    let mut chars = base.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Terminal success/error summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
}

impl ResultEvent {
    /// Whether the upstream reported a failed turn.
    pub fn is_failure(&self) -> bool {
        self.is_error.unwrap_or(false)
            || self.subtype.as_deref() == Some("error")
            || self.error.is_some()
    }

    /// Human-readable failure message, if any.
    pub fn error_message(&self) -> Option<String> {
        if !self.is_failure() {
            return None;
        }
        let error = self.error.as_ref();
        let message = error
            .and_then(|e| e.message.clone())
            .or_else(|| error.and_then(|e| e.details.clone()))
            .or_else(|| self.result.clone())
            .unwrap_or_else(|| "upstream agent reported an error".to_string());
        Some(message)
    }
}

/// Error payload on a [`ResultEvent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl StreamEvent {
    /// Assistant event carrying at least one text block.
    pub fn is_assistant_text(&self) -> bool {
        match self {
            Self::Assistant(event) => event.has_text(),
            _ => false,
        }
    }

    /// Thinking event, or assistant event carrying at least one thinking block.
    pub fn is_thinking(&self) -> bool {
        match self {
            Self::Thinking(_) => true,
            Self::Assistant(event) => event.has_thinking(),
            _ => false,
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall(_))
    }

    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// Concatenated text blocks of an assistant event.
    pub fn extract_text(&self) -> Option<String> {
        match self {
            Self::Assistant(event) if event.has_text() => Some(event.text()),
            _ => None,
        }
    }

    /// Concatenated thinking of a thinking or assistant event.
    pub fn extract_thinking(&self) -> Option<String> {
        match self {
            Self::Thinking(event) => Some(event.thinking()),
            Self::Assistant(event) if event.has_thinking() => Some(event.thinking()),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallEvent> {
        match self {
            Self::ToolCall(event) => Some(event),
            _ => None,
        }
    }

    /// Event discriminant as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::System(_) => "system",
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::Thinking(_) => "thinking",
            Self::ToolCall(_) => "tool_call",
            Self::Result(_) => "result",
        }
    }
}

impl MessageEvent {
    fn has_text(&self) -> bool {
        self.message
            .content
            .iter()
            .any(|block| matches!(block, ContentBlock::Text { .. }))
    }

    fn has_thinking(&self) -> bool {
        self.message
            .content
            .iter()
            .any(|block| matches!(block, ContentBlock::Thinking { .. }))
    }

    fn text(&self) -> String {
        self.message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn thinking(&self) -> String {
        self.message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Thinking { thinking } => Some(thinking.as_str()),
                _ => None,
            })
            .collect()
    }
}
