//! Arguments handed to proxy-side tool executors.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RelayError;
use crate::types::OpenAiToolCall;

/// Parsed arguments of one repaired tool call.
#[derive(Debug, Clone, Default)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Arguments of an OpenAI tool call; unparseable text becomes `{}`.
    pub fn from_tool_call(call: &OpenAiToolCall) -> Self {
        Self::new(
            call.parsed_arguments()
                .unwrap_or_else(|| Value::Object(Default::default())),
        )
    }

    pub fn raw(&self) -> &Value {
        &self.value
    }

    /// Required string argument.
    pub fn get_str(&self, key: &str) -> Result<&str, RelayError> {
        self.get_str_opt(key)
            .ok_or_else(|| RelayError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    /// Argument `key` decoded as `T`; absent and mistyped values are errors.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, RelayError> {
        let value = self
            .value
            .get(key)
            .ok_or_else(|| RelayError::InvalidArgument(format!("Missing argument: {key}")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| RelayError::InvalidArgument(format!("Invalid argument {key}: {e}")))
    }

    /// All arguments decoded as one struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, RelayError> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| RelayError::InvalidArgument(format!("Invalid arguments: {e}")))
    }
}
