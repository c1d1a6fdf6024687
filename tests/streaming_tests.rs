//! Tests for event parsing, delta tracking and stream conversion.

mod common;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;

use agent_relay::intercept::{SchemaFailureMode, TerminationReason, ToolInterceptor};
use agent_relay::streaming::*;
use agent_relay::types::{FinishReason, OpenAiToolCall, StreamEvent};

fn event(line: &str) -> StreamEvent {
    parse_line(line).expect("parseable event")
}

fn assistant_line(text: &str) -> String {
    json!({
        "type": "assistant",
        "message": { "role": "assistant", "content": [{ "type": "text", "text": text }] }
    })
    .to_string()
}

#[test]
fn parser_skips_noise_without_failing() {
    for line in ["", "   ", "not json", "[1,2]", "42", r#"{"type":"mystery"}"#, r#"{"no_type":true}"#] {
        assert_eq!(parse_line(line), None, "line {line:?}");
    }
    assert!(parse_line(&assistant_line("hi")).is_some());
}

#[test]
fn mixed_content_event_is_both_assistant_and_thinking() {
    let event = event(
        &json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [
                    { "type": "thinking", "thinking": "hmm" },
                    { "type": "text", "text": "answer" },
                    { "type": "image", "url": "ignored" }
                ]
            }
        })
        .to_string(),
    );

    assert!(event.is_assistant_text());
    assert!(event.is_thinking());
    assert_eq!(event.extract_text().as_deref(), Some("answer"));
    assert_eq!(event.extract_thinking().as_deref(), Some("hmm"));
}

#[test]
fn tracker_emits_suffix_for_extensions_and_full_snapshot_on_divergence() {
    let mut tracker = DeltaTracker::new();
    assert_eq!(tracker.next_text("Hello"), "Hello");
    assert_eq!(tracker.next_text("Hello, world"), ", world");
    assert_eq!(tracker.next_text("Goodbye"), "Goodbye");
    assert_eq!(tracker.next_text("Goodbye"), "");

    assert_eq!(tracker.next_thinking("plan"), "plan");
    assert_eq!(tracker.next_thinking("plan more"), " more");

    tracker.reset();
    assert_eq!(tracker.next_text("Goodbye"), "Goodbye");
}

#[test]
fn tracker_handles_multibyte_prefixes() {
    let mut tracker = DeltaTracker::new();
    assert_eq!(tracker.next_text("héllo"), "héllo");
    assert_eq!(tracker.next_text("héllo wörld"), " wörld");
}

#[test]
fn ai_sdk_parts_follow_tool_call_lifecycle() {
    let mut converter = StreamToAiSdkParts::new();
    let started = event(
        &json!({
            "type": "tool_call",
            "subtype": "started",
            "call_id": "c1",
            "tool_call": { "readToolCall": { "args": { "path": "a.txt" } } }
        })
        .to_string(),
    );
    let completed = event(
        &json!({
            "type": "tool_call",
            "subtype": "completed",
            "call_id": "c1",
            "tool_call": { "readToolCall": { "args": { "path": "a.txt" }, "result": { "success": true } } }
        })
        .to_string(),
    );

    let first = converter.handle_event(&started);
    let second = converter.handle_event(&completed);

    assert_eq!(
        first,
        vec![
            AiSdkStreamPart::ToolCallStreamingStart {
                tool_call_id: "c1".into(),
                tool_name: "read".into(),
            },
            AiSdkStreamPart::ToolCallDelta {
                tool_call_id: "c1".into(),
                tool_name: "read".into(),
                args_text_delta: r#"{"path":"a.txt"}"#.into(),
            },
        ]
    );
    assert_eq!(
        second,
        vec![AiSdkStreamPart::ToolInputAvailable {
            tool_call_id: "c1".into(),
            tool_name: "read".into(),
            input_text: r#"{"success":true}"#.into(),
        }]
    );
}

#[test]
fn ai_sdk_text_deltas_skip_repeated_snapshots() {
    let mut converter = StreamToAiSdkParts::new();
    let mut deltas = Vec::new();
    for text in ["He", "Hello", "Hello"] {
        deltas.extend(converter.handle_event(&event(&assistant_line(text))));
    }

    assert_eq!(
        deltas,
        vec![
            AiSdkStreamPart::TextDelta { text_delta: "He".into() },
            AiSdkStreamPart::TextDelta { text_delta: "llo".into() },
        ]
    );
}

#[test]
fn openai_chunks_carry_role_once_and_finish_on_error_result() {
    let mut converter = StreamToOpenAiChunks::new(common::meta());
    let mut chunks = converter.handle_event(&event(&assistant_line("Hi")));
    chunks.extend(converter.handle_event(&event(&assistant_line("Hi there"))));
    chunks.extend(converter.handle_event(&event(
        r#"{"type":"result","subtype":"error","is_error":true,"error":{"message":"upstream crashed"}}"#,
    )));

    let roles: Vec<Option<String>> = chunks
        .iter()
        .map(|c| c.delta().and_then(|d| d.role.clone()))
        .collect();
    assert_eq!(roles, vec![Some("assistant".into()), None, None, None]);

    let contents: Vec<Option<String>> = chunks
        .iter()
        .map(|c| c.delta().and_then(|d| d.content.clone()))
        .collect();
    assert_eq!(
        contents,
        vec![
            Some("Hi".into()),
            Some(" there".into()),
            Some("upstream crashed".into()),
            None
        ]
    );
    assert_eq!(chunks[3].finish_reason(), Some(FinishReason::Stop));
    assert!(converter.is_finished());
    assert_eq!(converter.finish(), None);
}

#[test]
fn tool_call_stream_chunks_end_with_tool_calls_finish() {
    let call = OpenAiToolCall::new("c1", "read", r#"{"path":"foo.txt"}"#);
    let [delta, finish] = create_tool_call_stream_chunks(&common::meta(), call.clone());

    let calls = delta.delta().and_then(|d| d.tool_calls.clone()).unwrap();
    assert_eq!(calls[0].index, 0);
    assert_eq!(calls[0].call, call);
    assert_eq!(delta.finish_reason(), None);
    assert_eq!(finish.finish_reason(), Some(FinishReason::ToolCalls));

    let response = create_tool_call_completion_response(&common::meta(), call);
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::ToolCalls));
}

#[tokio::test]
async fn session_terminates_on_strict_schema_failure() {
    let interceptor = ToolInterceptor::new(common::allowed_tools(), common::schema_map(), common::meta())
        .with_schema_failure_mode(SchemaFailureMode::Strict);
    let lines = vec![
        Ok(assistant_line("Let me read that.")),
        Ok(json!({
            "type": "tool_call",
            "subtype": "started",
            "call_id": "c1",
            "tool_call": { "readToolCall": { "args": {} } }
        })
        .to_string()),
        Ok(assistant_line("Let me read that. Never sent")),
    ];

    let outputs: Vec<SessionOutput> = StreamSession::new(interceptor)
        .run(futures::stream::iter(lines))
        .map(|output| output.unwrap())
        .collect()
        .await;

    let termination = outputs
        .iter()
        .find_map(|o| match o {
            SessionOutput::Terminated(t) => Some(t.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(termination.reason, TerminationReason::SchemaValidation);
    assert_eq!(termination.missing, vec!["path".to_string()]);

    let SessionOutput::Chunk(last) = outputs.last().unwrap() else {
        panic!("expected a closing chunk");
    };
    assert_eq!(last.finish_reason(), Some(FinishReason::Stop));
    assert!(!outputs.iter().any(|o| matches!(
        o,
        SessionOutput::Chunk(c) if c.delta().and_then(|d| d.content.as_deref()) == Some(" Never sent")
    )));
}
