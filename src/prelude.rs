//! Convenience re-exports for common use.

pub use crate::config::RelayConfig;
pub use crate::error::{BoundaryError, RelayError, Result};
pub use crate::guard::{LoopGuard, LoopGuardDecision};
pub use crate::intercept::{
    BoundaryMode, InterceptionDecision, InterceptionSink, SchemaFailureMode, Termination,
    TerminationReason, ToolInterceptor, ToolLoopMode,
};
pub use crate::streaming::{
    lines_from_reader, parse_line, SessionOutput, StreamSession, StreamToAiSdkParts,
    StreamToOpenAiChunks,
};
pub use crate::tools::{
    apply_compat, build_tool_schema_map, extract_allowed_tool_names, extract_tool_call,
    FnToolExecutor, SchemaMap, ToolArguments, ToolExecutor, ToolRouter,
};
pub use crate::types::{ChatCompletionChunk, ChatMessage, OpenAiToolCall, ResponseMeta, StreamEvent};
