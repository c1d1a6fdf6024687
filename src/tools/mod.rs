//! Tool-call reconciliation: extraction, schema compatibility, execution routing.

pub mod arguments;
pub mod compat;
pub mod extract;
pub mod router;
pub mod schema;
pub mod updates;
pub mod validation;

pub use arguments::ToolArguments;
pub use compat::{apply_compat, CompatResult};
pub use extract::{
    extract_tool_call, normalize_alias_key, resolve_allowed_tool_name, to_openai_arguments,
    ToolCallCandidate, UNKNOWN_CALL_ID,
};
pub use router::{FnToolExecutor, ToolExecutor, ToolOutput, ToolRouter, ToolStatus};
pub use schema::{
    build_tool_schema_map, extract_allowed_tool_names, PropertySchema, SchemaMap, ToolSchema,
};
pub use updates::{ToolKind, ToolLocation, ToolMapper, ToolUpdate, ToolUpdateStatus};
pub use validation::{validate_arguments, TypeError, ValidationResult};
