//! Caller-declared tool schemas.
//!
//! Tool declarations arrive as JSON in either the OpenAI function-wrapped
//! shape (`{type:"function", function:{name, parameters}}`) or a flat
//! `{name, parameters}` shape. Only the parts the compatibility engine needs
//! are kept: property types, the required list, and `additionalProperties`.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;

/// Declared type(s) of one schema property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySchema {
    /// Primitive JSON type names; empty means "any".
    pub types: Vec<String>,
}

impl PropertySchema {
    pub fn new(types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    fn from_json(value: &Value) -> Self {
        let types = match value.get("type") {
            Some(Value::String(kind)) => vec![kind.clone()],
            Some(Value::Array(kinds)) => kinds
                .iter()
                .filter_map(|kind| kind.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Self { types }
    }

    /// Human-readable expected type (`string`, `string|null`, `any`).
    pub fn expected(&self) -> String {
        if self.types.is_empty() {
            "any".to_string()
        } else {
            self.types.join("|")
        }
    }
}

/// Parameter contract of one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSchema {
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
    pub additional_properties: bool,
}

impl Default for ToolSchema {
    fn default() -> Self {
        Self {
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }
}

impl ToolSchema {
    /// Build from a JSON-schema `parameters` object.
    pub fn from_json(parameters: &Value) -> Self {
        let properties = parameters
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| (name.clone(), PropertySchema::from_json(prop)))
                    .collect()
            })
            .unwrap_or_default();
        let required = parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| name.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        // An object-valued additionalProperties still admits extra keys.
        let additional_properties = !matches!(
            parameters.get("additionalProperties"),
            Some(Value::Bool(false))
        );

        Self {
            properties,
            required,
            additional_properties,
        }
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn requires(&self, name: &str) -> bool {
        self.required.iter().any(|required| required == name)
    }
}

/// Schemas keyed by canonical tool name.
pub type SchemaMap = HashMap<String, ToolSchema>;

/// Name and parameters of one declaration, in either accepted shape.
fn declaration(tool: &Value) -> Option<(&str, Option<&Value>)> {
    let body = match tool.get("function") {
        Some(function) if function.is_object() => function,
        _ => tool,
    };
    let name = body.get("name").and_then(Value::as_str)?.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, body.get("parameters")))
}

/// Names of every well-formed declaration.
pub fn extract_allowed_tool_names(tools: &[Value]) -> HashSet<String> {
    tools
        .iter()
        .filter_map(declaration)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Schema map for every declaration that carries `parameters`.
pub fn build_tool_schema_map(tools: &[Value]) -> SchemaMap {
    tools
        .iter()
        .filter_map(declaration)
        .filter_map(|(name, parameters)| {
            parameters
                .filter(|p| p.is_object())
                .map(|p| (name.to_string(), ToolSchema::from_json(p)))
        })
        .collect()
}
