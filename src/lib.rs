//! agent-relay: coding-agent NDJSON streams to OpenAI and AI-SDK streams.
//!
//! The relay sits between a client speaking the OpenAI chat-completions
//! protocol and an upstream coding agent that emits newline-delimited JSON
//! events. It reconciles upstream tool calls against the tools the client
//! declared, repairs drifted argument shapes, and stops turns that keep
//! repeating the same failure.
//!
//! # Quick Start
//!
//! ```no_run
//! use agent_relay::prelude::*;
//! use futures::StreamExt;
//!
//! # async fn example() -> agent_relay::error::Result<()> {
//! let tools = vec![serde_json::json!({
//!     "type": "function",
//!     "function": { "name": "read", "parameters": { "type": "object" } }
//! })];
//! let interceptor = ToolInterceptor::from_config(
//!     &RelayConfig::from_env(),
//!     extract_allowed_tool_names(&tools),
//!     build_tool_schema_map(&tools),
//!     ResponseMeta::new("agent"),
//! );
//!
//! let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//! let mut outputs = StreamSession::new(interceptor).run(lines_from_reader(stdin));
//! while let Some(output) = outputs.next().await {
//!     if let SessionOutput::Chunk(chunk) = output? {
//!         print!("{}", chunk.to_sse()?);
//!     }
//! }
//! print!("{}", agent_relay::types::SSE_DONE);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod guard;
pub mod intercept;
pub mod prelude;
pub mod streaming;
pub mod tools;
pub mod types;
