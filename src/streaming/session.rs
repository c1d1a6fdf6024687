//! Per-turn pipeline: NDJSON lines in, OpenAI chunks out.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::sync::Mutex;
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;

use super::openai::{create_text_chunk, create_tool_call_stream_chunks, StreamToOpenAiChunks};
use super::parser::parse_line;
use crate::error::{RelayError, Result};
use crate::intercept::{InterceptionSink, Termination, ToolInterceptor};
use crate::tools::ToolUpdate;
use crate::types::{ChatCompletionChunk, OpenAiToolCall, StreamEvent};

/// NDJSON lines from any buffered async reader.
pub fn lines_from_reader<R>(reader: R) -> LinesStream<R>
where
    R: AsyncBufRead + Unpin,
{
    LinesStream::new(reader.lines())
}

/// One item produced by a [`StreamSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum SessionOutput {
    Chunk(ChatCompletionChunk),
    ToolUpdate(ToolUpdate),
    /// The turn ended early; no further output follows.
    Terminated(Termination),
}

/// Collects interceptor side effects until the session flushes them.
#[derive(Default)]
struct BufferedSink {
    outputs: Mutex<Vec<SessionOutput>>,
    intercepted: Mutex<Option<OpenAiToolCall>>,
}

impl BufferedSink {
    async fn drain(&self) -> Vec<SessionOutput> {
        std::mem::take(&mut *self.outputs.lock().await)
    }

    async fn take_intercepted(&self) -> Option<OpenAiToolCall> {
        self.intercepted.lock().await.take()
    }
}

#[async_trait]
impl InterceptionSink for BufferedSink {
    async fn on_tool_update(&self, update: ToolUpdate) -> Result<()> {
        self.outputs.lock().await.push(SessionOutput::ToolUpdate(update));
        Ok(())
    }

    async fn on_tool_result(&self, chunk: ChatCompletionChunk) -> Result<()> {
        self.outputs.lock().await.push(SessionOutput::Chunk(chunk));
        Ok(())
    }

    async fn on_intercepted_tool_call(&self, call: OpenAiToolCall) -> Result<()> {
        *self.intercepted.lock().await = Some(call);
        Ok(())
    }
}

/// One streamed turn.
///
/// Tool-call events go through the interceptor; everything else goes through
/// the chunk converter. The stream ends at the first intercepted call (with a
/// `tool_calls` finish chunk), at the first termination, on cancellation, or
/// when the input ends.
pub struct StreamSession {
    interceptor: ToolInterceptor,
    cancel: CancellationToken,
}

impl StreamSession {
    pub fn new(interceptor: ToolInterceptor) -> Self {
        Self {
            interceptor,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drive the turn over `lines`.
    pub fn run<S>(self, lines: S) -> BoxStream<'static, Result<SessionOutput>>
    where
        S: futures::Stream<Item = std::io::Result<String>> + Send + 'static,
    {
        let Self {
            mut interceptor,
            cancel,
        } = self;
        let mut converter = StreamToOpenAiChunks::new(interceptor.meta().clone());
        let sink = BufferedSink::default();

        let outputs = async_stream::stream! {
            let mut inner = std::pin::pin!(lines);
            loop {
                // Cancellation wins over a stalled upstream.
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    line = inner.next() => Some(line),
                };
                let Some(line) = next else {
                    tracing::debug!("stream session cancelled");
                    yield Err(RelayError::Cancelled);
                    return;
                };
                let Some(line) = line else {
                    break;
                };

                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(RelayError::Io(e));
                        return;
                    }
                };
                let Some(event) = parse_line(&line) else {
                    continue;
                };

                if let StreamEvent::ToolCall(tool_event) = &event {
                    let decision = interceptor.handle_event(tool_event, &sink).await;
                    for output in sink.drain().await {
                        yield Ok(output);
                    }
                    match decision {
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                        Ok(Some(decision)) => {
                            if let Some(termination) = decision.terminate {
                                let message = termination.message.clone();
                                yield Ok(SessionOutput::Terminated(termination));
                                yield Ok(SessionOutput::Chunk(create_text_chunk(
                                    converter.meta(),
                                    message,
                                    true,
                                )));
                                return;
                            }
                            if let Some(call) = sink.take_intercepted().await {
                                for chunk in create_tool_call_stream_chunks(converter.meta(), call) {
                                    yield Ok(SessionOutput::Chunk(chunk));
                                }
                                return;
                            }
                            if decision.skip_converter {
                                continue;
                            }
                        }
                        Ok(None) => {}
                    }
                }

                for chunk in converter.handle_event(&event) {
                    yield Ok(SessionOutput::Chunk(chunk));
                }
                if converter.is_finished() {
                    return;
                }
            }

            if let Some(chunk) = converter.finish() {
                yield Ok(SessionOutput::Chunk(chunk));
            }
        };
        Box::pin(outputs)
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("interceptor", &self.interceptor)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
