//! Tool execution seam for proxy-execute mode.
//!
//! The relay never runs tools itself. Executors are injected; the router picks
//! the first one that claims a tool and wraps its output into the synthetic
//! tool-result chunk streamed back to the caller.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::arguments::ToolArguments;
use crate::error::RelayError;
use crate::types::{
    ChatCompletionChunk, ChunkDelta, OpenAiToolCall, ResponseMeta, ToolCallDelta,
};

/// Upper bound on the serialized tool-result arguments, in characters.
pub const MAX_RESULT_CHARS: usize = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Result of one tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            output: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Text handed back to the model: the output, or `Error: <message>`.
    pub fn render(&self) -> String {
        match self.status {
            ToolStatus::Success => self.output.clone().unwrap_or_default(),
            ToolStatus::Error => format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("unknown")
            ),
        }
    }
}

/// An injected tool backend.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools this executor can run.
    fn tool_names(&self) -> Vec<String>;

    fn can_execute(&self, tool_name: &str) -> bool {
        self.tool_names().iter().any(|name| name == tool_name)
    }

    async fn execute(
        &self,
        tool_name: &str,
        args: &ToolArguments,
    ) -> Result<ToolOutput, RelayError>;
}

type ToolHandler = dyn Fn(ToolArguments) -> Pin<Box<dyn Future<Output = Result<String, RelayError>> + Send>>
    + Send
    + Sync;

/// Closure-backed executor for quick registration.
#[derive(Default)]
pub struct FnToolExecutor {
    handlers: HashMap<String, Arc<ToolHandler>>,
}

impl FnToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`.
    pub fn with_tool<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, RelayError>> + Send + 'static,
    {
        self.handlers
            .insert(name.into(), Arc::new(move |args| Box::pin(handler(args))));
        self
    }
}

#[async_trait]
impl ToolExecutor for FnToolExecutor {
    fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    fn can_execute(&self, tool_name: &str) -> bool {
        self.handlers.contains_key(tool_name)
    }

    async fn execute(
        &self,
        tool_name: &str,
        args: &ToolArguments,
    ) -> Result<ToolOutput, RelayError> {
        let handler = self
            .handlers
            .get(tool_name)
            .ok_or_else(|| RelayError::tool(tool_name, "unknown tool"))?;
        match handler(args.clone()).await {
            Ok(output) => Ok(ToolOutput::success(output)),
            Err(RelayError::ToolExecution { message, .. }) => Ok(ToolOutput::error(message)),
            Err(e) => Ok(ToolOutput::error(e.to_string())),
        }
    }
}

impl std::fmt::Debug for FnToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnToolExecutor")
            .field("tools", &self.tool_names())
            .finish()
    }
}

/// Ordered chain of executors.
#[derive(Clone, Default)]
pub struct ToolRouter {
    executors: Vec<Arc<dyn ToolExecutor>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executors.push(executor);
        self
    }

    /// Union of every executor's tool names.
    pub fn tool_names(&self) -> HashSet<String> {
        self.executors
            .iter()
            .flat_map(|executor| executor.tool_names())
            .collect()
    }

    pub fn can_execute(&self, tool_name: &str) -> bool {
        self.executors
            .iter()
            .any(|executor| executor.can_execute(tool_name))
    }

    /// Run `tool_name` on the first executor that claims it.
    ///
    /// Executor failures are folded into an error output; this never fails.
    pub async fn execute(&self, tool_name: &str, args: &ToolArguments) -> ToolOutput {
        let Some(executor) = self
            .executors
            .iter()
            .find(|executor| executor.can_execute(tool_name))
        else {
            return ToolOutput::error(format!("No executor available for {tool_name}"));
        };

        match executor.execute(tool_name, args).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "executor returned an error");
                ToolOutput::error(e.to_string())
            }
        }
    }

    /// Execute `call` and build the tool-result chunk streamed to the caller.
    pub async fn handle_tool_call(
        &self,
        call: &OpenAiToolCall,
        meta: &ResponseMeta,
    ) -> ChatCompletionChunk {
        let args = ToolArguments::from_tool_call(call);
        let output = self.execute(call.name(), &args).await;
        tracing::debug!(
            tool = call.name(),
            call_id = %call.id,
            status = %output.status,
            "tool executed"
        );
        tool_result_chunk(meta, call, &output)
    }
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("executors", &self.executors.len())
            .finish()
    }
}

/// Chunk carrying `{"result": ...}` as the arguments of `call`.
pub fn tool_result_chunk(
    meta: &ResponseMeta,
    call: &OpenAiToolCall,
    output: &ToolOutput,
) -> ChatCompletionChunk {
    let arguments = serde_json::json!({ "result": output.render() }).to_string();
    let delta = ChunkDelta {
        role: Some("assistant".to_string()),
        tool_calls: Some(vec![ToolCallDelta {
            index: 0,
            call: OpenAiToolCall::new(
                call.id.clone(),
                call.name(),
                truncate_chars(&arguments, MAX_RESULT_CHARS),
            ),
        }]),
        ..Default::default()
    };
    ChatCompletionChunk::new(meta, delta, None)
}

/// Prefix of `text` holding at most `max` characters.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FailingExecutor;

    #[async_trait]
    impl ToolExecutor for FailingExecutor {
        fn tool_names(&self) -> Vec<String> {
            vec!["bash".to_string()]
        }

        async fn execute(
            &self,
            tool_name: &str,
            _args: &ToolArguments,
        ) -> Result<ToolOutput, RelayError> {
            Err(RelayError::Stream(format!("{tool_name} pipe closed")))
        }
    }

    fn meta() -> ResponseMeta {
        ResponseMeta {
            id: "resp-1".into(),
            created: 1,
            model: "auto".into(),
        }
    }

    fn echo_router() -> ToolRouter {
        let executor = FnToolExecutor::new()
            .with_tool("echo", |args: ToolArguments| async move {
                args.get_str("text").map(str::to_string)
            })
            .with_tool("boom", |_args: ToolArguments| async move {
                Err::<String, _>(RelayError::tool("boom", "exploded"))
            });
        ToolRouter::new()
            .with_executor(Arc::new(executor))
            .with_executor(Arc::new(FailingExecutor))
    }

    #[tokio::test]
    async fn routes_to_first_capable_executor() {
        let router = echo_router();
        let args = ToolArguments::new(serde_json::json!({ "text": "hi" }));

        assert_eq!(router.execute("echo", &args).await, ToolOutput::success("hi"));
        assert_eq!(router.execute("boom", &args).await.render(), "Error: exploded");
        assert_eq!(
            router.execute("missing", &args).await.render(),
            "Error: No executor available for missing"
        );
        assert!(router.tool_names().contains("bash"));
    }

    #[tokio::test]
    async fn executor_errors_become_error_outputs() {
        let output = echo_router()
            .execute("bash", &ToolArguments::default())
            .await;

        assert!(!output.is_success());
        assert_eq!(output.render(), "Error: Stream error: bash pipe closed");
    }

    #[tokio::test]
    async fn handle_tool_call_wraps_result_in_chunk() {
        let call = OpenAiToolCall::new("c1", "echo", r#"{"text":"hello"}"#);

        let chunk = echo_router().handle_tool_call(&call, &meta()).await;
        let delta = chunk.delta().unwrap();
        let tool_call = &delta.tool_calls.as_ref().unwrap()[0].call;

        assert_eq!(delta.role.as_deref(), Some("assistant"));
        assert_eq!(tool_call.id, "c1");
        assert_eq!(tool_call.function.arguments, r#"{"result":"hello"}"#);
        assert_eq!(chunk.finish_reason(), None);
    }

    #[test]
    fn result_arguments_are_truncated_on_char_boundary() {
        let output = ToolOutput::success("é".repeat(MAX_RESULT_CHARS));
        let chunk = tool_result_chunk(&meta(), &OpenAiToolCall::new("c1", "read", "{}"), &output);
        let arguments = &chunk.delta().unwrap().tool_calls.as_ref().unwrap()[0]
            .call
            .function
            .arguments;

        assert_eq!(arguments.chars().count(), MAX_RESULT_CHARS);
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
