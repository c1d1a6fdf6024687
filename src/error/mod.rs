//! Error types for the relay.

use thiserror::Error;

/// Primary error type for all relay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("Boundary extraction error: {0}")]
    Boundary(#[from] BoundaryError),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Callback error: {0}")]
    Callback(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Defect inside a specific tool-call boundary implementation.
///
/// This is the only failure class the interceptor retries through the legacy
/// boundary. Validation failures and loop-guard terminations are decisions,
/// not errors, and never take this path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("tool_call mapping has {count} keys ({keys}); expected exactly one")]
    AmbiguousToolKey { count: usize, keys: String },

    #[error("unsupported payload for '{tool}': {kind}")]
    UnsupportedPayload { tool: String, kind: &'static str },

    #[error("{0}")]
    Extraction(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Serialization,
    Extraction,
    ToolExecution,
    Callback,
    Stream,
    Cancelled,
    Unknown,
}

impl RelayError {
    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::ConfigFile(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Boundary(_) => ErrorCategory::Extraction,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Callback(_) => ErrorCategory::Callback,
            Self::Stream(_) | Self::Io(_) => ErrorCategory::Stream,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::InvalidArgument(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether the interceptor may retry this failure through the legacy boundary.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, Self::Boundary(_))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RelayError>;
