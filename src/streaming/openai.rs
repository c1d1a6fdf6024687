//! Upstream events to OpenAI `chat.completion` / `chat.completion.chunk` units.

use super::delta::DeltaTracker;
use crate::types::{
    ChatCompletion, ChatCompletionChunk, ChunkDelta, CompletionChoice, CompletionMessage,
    FinishReason, OpenAiToolCall, ResponseMeta, StreamEvent, ToolCallDelta,
    CHAT_COMPLETION_OBJECT,
};

const ASSISTANT_ROLE: &str = "assistant";

/// Stateful converter from upstream events to OpenAI streaming chunks.
///
/// One instance per response. The first content-bearing chunk carries
/// `role: "assistant"`; a terminal `result` event produces the finish chunk.
#[derive(Debug)]
pub struct StreamToOpenAiChunks {
    meta: ResponseMeta,
    tracker: DeltaTracker,
    role_sent: bool,
    finished: bool,
}

impl StreamToOpenAiChunks {
    pub fn new(meta: ResponseMeta) -> Self {
        Self {
            meta,
            tracker: DeltaTracker::new(),
            role_sent: false,
            finished: false,
        }
    }

    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Convert one event into zero or more chunks.
    pub fn handle_event(&mut self, event: &StreamEvent) -> Vec<ChatCompletionChunk> {
        if self.finished {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        if let Some(thinking) = event.extract_thinking() {
            let delta = self.tracker.next_thinking(&thinking);
            if !delta.is_empty() {
                let delta = ChunkDelta {
                    reasoning_content: Some(delta),
                    ..self.role_delta()
                };
                chunks.push(ChatCompletionChunk::new(&self.meta, delta, None));
            }
        }
        if let Some(text) = event.extract_text() {
            let delta = self.tracker.next_text(&text);
            if !delta.is_empty() {
                let delta = ChunkDelta {
                    content: Some(delta),
                    ..self.role_delta()
                };
                chunks.push(ChatCompletionChunk::new(&self.meta, delta, None));
            }
        }

        if let StreamEvent::Result(result) = event {
            if let Some(message) = result.error_message() {
                let delta = ChunkDelta {
                    content: Some(message),
                    ..self.role_delta()
                };
                chunks.push(ChatCompletionChunk::new(&self.meta, delta, None));
            }
            chunks.extend(self.finish());
        }

        chunks
    }

    /// Emit the `stop` finish chunk unless one was already produced.
    pub fn finish(&mut self) -> Option<ChatCompletionChunk> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(ChatCompletionChunk::new(
            &self.meta,
            ChunkDelta::default(),
            Some(FinishReason::Stop),
        ))
    }

    fn role_delta(&mut self) -> ChunkDelta {
        if self.role_sent {
            return ChunkDelta::default();
        }
        self.role_sent = true;
        ChunkDelta {
            role: Some(ASSISTANT_ROLE.to_string()),
            ..Default::default()
        }
    }
}

/// Non-streaming response handing one tool call back to the caller.
pub fn create_tool_call_completion_response(
    meta: &ResponseMeta,
    tool_call: OpenAiToolCall,
) -> ChatCompletion {
    ChatCompletion {
        id: meta.id.clone(),
        object: CHAT_COMPLETION_OBJECT.to_string(),
        created: meta.created,
        model: meta.model.clone(),
        choices: vec![CompletionChoice {
            index: 0,
            message: CompletionMessage {
                role: ASSISTANT_ROLE.to_string(),
                content: None,
                tool_calls: Some(vec![tool_call]),
            },
            finish_reason: Some(FinishReason::ToolCalls),
        }],
    }
}

/// Streaming form of [`create_tool_call_completion_response`]: a delta chunk
/// carrying the call followed by a `tool_calls` finish chunk.
pub fn create_tool_call_stream_chunks(
    meta: &ResponseMeta,
    tool_call: OpenAiToolCall,
) -> [ChatCompletionChunk; 2] {
    let delta = ChunkDelta {
        role: Some(ASSISTANT_ROLE.to_string()),
        tool_calls: Some(vec![ToolCallDelta {
            index: 0,
            call: tool_call,
        }]),
        ..Default::default()
    };
    [
        ChatCompletionChunk::new(meta, delta, None),
        ChatCompletionChunk::new(meta, ChunkDelta::default(), Some(FinishReason::ToolCalls)),
    ]
}

/// Non-streaming text response.
pub fn create_chat_completion(meta: &ResponseMeta, content: impl Into<String>) -> ChatCompletion {
    ChatCompletion {
        id: meta.id.clone(),
        object: CHAT_COMPLETION_OBJECT.to_string(),
        created: meta.created,
        model: meta.model.clone(),
        choices: vec![CompletionChoice {
            index: 0,
            message: CompletionMessage {
                role: ASSISTANT_ROLE.to_string(),
                content: Some(content.into()),
                tool_calls: None,
            },
            finish_reason: Some(FinishReason::Stop),
        }],
    }
}

/// Single content chunk, optionally finishing the stream.
pub fn create_text_chunk(
    meta: &ResponseMeta,
    content: impl Into<String>,
    done: bool,
) -> ChatCompletionChunk {
    let delta = ChunkDelta {
        content: Some(content.into()),
        ..Default::default()
    };
    ChatCompletionChunk::new(meta, delta, done.then_some(FinishReason::Stop))
}

/// Synthetic assistant chunk telling the model a tool call was skipped.
pub fn create_hint_chunk(meta: &ResponseMeta, hint: impl Into<String>) -> ChatCompletionChunk {
    let delta = ChunkDelta {
        role: Some(ASSISTANT_ROLE.to_string()),
        content: Some(hint.into()),
        ..Default::default()
    };
    ChatCompletionChunk::new(meta, delta, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn meta() -> ResponseMeta {
        ResponseMeta {
            id: "resp-1".into(),
            created: 7,
            model: "auto".into(),
        }
    }

    fn event(value: serde_json::Value) -> StreamEvent {
        serde_json::from_value(value).unwrap()
    }

    fn assistant(text: &str) -> StreamEvent {
        event(json!({
            "type": "assistant",
            "message": { "role": "assistant", "content": [{ "type": "text", "text": text }] }
        }))
    }

    #[test]
    fn text_snapshots_become_deltas_with_role_on_first_chunk() {
        let mut converter = StreamToOpenAiChunks::new(meta());

        let first = converter.handle_event(&assistant("Hel"));
        let second = converter.handle_event(&assistant("Hello"));

        assert_eq!(first[0].delta().unwrap().role.as_deref(), Some("assistant"));
        assert_eq!(first[0].delta().unwrap().content.as_deref(), Some("Hel"));
        assert_eq!(second[0].delta().unwrap().role, None);
        assert_eq!(second[0].delta().unwrap().content.as_deref(), Some("lo"));
    }

    #[test]
    fn thinking_maps_to_reasoning_content() {
        let mut converter = StreamToOpenAiChunks::new(meta());
        let chunks = converter.handle_event(&event(json!({
            "type": "thinking",
            "message": { "content": [{ "type": "thinking", "thinking": "Plan" }] }
        })));

        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].delta().unwrap().reasoning_content.as_deref(),
            Some("Plan")
        );
    }

    #[test]
    fn error_result_emits_message_then_stop() {
        let mut converter = StreamToOpenAiChunks::new(meta());
        let chunks = converter.handle_event(&event(json!({
            "type": "result",
            "subtype": "error",
            "is_error": true,
            "result": "agent crashed"
        })));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].delta().unwrap().content.as_deref(), Some("agent crashed"));
        assert_eq!(chunks[1].finish_reason(), Some(FinishReason::Stop));
        assert!(converter.finish().is_none());
    }

    #[test]
    fn tool_call_stream_chunks_shape() {
        let [delta, finish] =
            create_tool_call_stream_chunks(&meta(), OpenAiToolCall::new("c1", "read", "{}"));

        assert_eq!(
            serde_json::to_value(&delta).unwrap()["choices"][0],
            json!({
                "index": 0,
                "delta": {
                    "role": "assistant",
                    "tool_calls": [{
                        "index": 0,
                        "id": "c1",
                        "type": "function",
                        "function": { "name": "read", "arguments": "{}" }
                    }]
                },
                "finish_reason": null
            })
        );
        assert_eq!(finish.finish_reason(), Some(FinishReason::ToolCalls));
        assert_eq!(finish.delta(), Some(&ChunkDelta::default()));
    }

    #[test]
    fn completion_response_carries_null_content() {
        let response =
            create_tool_call_completion_response(&meta(), OpenAiToolCall::new("c1", "read", "{}"));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["message"]["content"], serde_json::Value::Null);
        assert_eq!(value["choices"][0]["finish_reason"], "tool_calls");
    }
}
