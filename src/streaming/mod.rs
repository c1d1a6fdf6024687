//! Upstream NDJSON parsing and conversion into downstream stream formats.

pub mod delta;
pub mod openai;
pub mod parser;
pub mod parts;
pub mod session;

pub use delta::{snapshot_delta, DeltaTracker};
pub use openai::{
    create_chat_completion, create_hint_chunk, create_text_chunk,
    create_tool_call_completion_response, create_tool_call_stream_chunks, StreamToOpenAiChunks,
};
pub use parser::parse_line;
pub use parts::{AiSdkStreamPart, StreamToAiSdkParts};
pub use session::{lines_from_reader, SessionOutput, StreamSession};
