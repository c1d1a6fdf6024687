//! Validate tool call arguments against a declared schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::ToolSchema;

/// A present argument whose runtime type disagrees with the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeError {
    pub name: String,
    pub expected_type: String,
    pub actual: String,
}

/// Outcome of validating one argument map.
///
/// `ok` holds exactly when `missing` and `type_errors` are both empty;
/// `unexpected` alone never fails validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub missing: Vec<String>,
    pub type_errors: Vec<TypeError>,
    pub unexpected: Vec<String>,
}

impl ValidationResult {
    /// Result for tools with no declared schema.
    pub fn pass() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn has_type_errors(&self) -> bool {
        !self.type_errors.is_empty()
    }

    /// Stable description of the failure, independent of argument values.
    pub fn signature(&self) -> String {
        let type_errors: Vec<String> = self
            .type_errors
            .iter()
            .map(|e| format!("{}:{}", e.name, e.expected_type))
            .collect();
        format!(
            "missing:{}|type:{}",
            self.missing.join(","),
            type_errors.join(",")
        )
    }

    /// Human-readable summary, e.g. `missing: path; type errors: limit (expected integer, got string)`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing: {}", self.missing.join(", ")));
        }
        if !self.type_errors.is_empty() {
            let errors: Vec<String> = self
                .type_errors
                .iter()
                .map(|e| format!("{} (expected {}, got {})", e.name, e.expected_type, e.actual))
                .collect();
            parts.push(format!("type errors: {}", errors.join(", ")));
        }
        if parts.is_empty() {
            "valid".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Validate `args` against `schema`.
///
/// Checks required presence and top-level property types. `unexpected` is
/// left empty; stripping is the compatibility engine's job.
pub fn validate_arguments(args: &Map<String, Value>, schema: &ToolSchema) -> ValidationResult {
    let missing: Vec<String> = schema
        .required
        .iter()
        .filter(|name| !args.contains_key(name.as_str()))
        .cloned()
        .collect();

    let type_errors: Vec<TypeError> = args
        .iter()
        .filter_map(|(name, value)| {
            let property = schema.properties.get(name)?;
            if property.types.is_empty()
                || property
                    .types
                    .iter()
                    .any(|expected| value_matches_type(value, expected))
            {
                return None;
            }
            Some(TypeError {
                name: name.clone(),
                expected_type: property.expected(),
                actual: json_type_name(value).to_string(),
            })
        })
        .collect();

    ValidationResult {
        ok: missing.is_empty() && type_errors.is_empty(),
        missing,
        type_errors,
        unexpected: Vec::new(),
    }
}

pub(crate) fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|n| n.fract() == 0.0)
        }
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema(value: Value) -> ToolSchema {
        ToolSchema::from_json(&value)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn reports_missing_required_fields_in_declared_order() {
        let schema = schema(json!({
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"]
        }));

        let result = validate_arguments(&args(json!({})), &schema);

        assert!(!result.ok);
        assert_eq!(result.missing, vec!["path", "content"]);
    }

    #[test]
    fn reports_type_mismatch() {
        let schema = schema(json!({
            "properties": { "count": { "type": "integer" } },
            "required": ["count"]
        }));

        let result = validate_arguments(&args(json!({ "count": "three" })), &schema);

        assert!(!result.ok);
        assert_eq!(
            result.type_errors,
            vec![TypeError {
                name: "count".into(),
                expected_type: "integer".into(),
                actual: "string".into(),
            }]
        );
        assert_eq!(result.describe(), "type errors: count (expected integer, got string)");
    }

    #[test]
    fn accepts_extra_fields_and_any_member_of_a_union() {
        let schema = schema(json!({
            "properties": { "limit": { "type": ["integer", "null"] } },
            "required": []
        }));

        assert!(validate_arguments(&args(json!({ "limit": null, "extra": 1 })), &schema).ok);
        assert!(validate_arguments(&args(json!({ "limit": 5 })), &schema).ok);
        assert!(!validate_arguments(&args(json!({ "limit": 1.5 })), &schema).ok);
    }

    #[test]
    fn integral_floats_count_as_integers() {
        let schema = schema(json!({
            "properties": { "limit": { "type": "integer" } },
            "required": ["limit"]
        }));

        assert!(validate_arguments(&args(json!({ "limit": 5.0 })), &schema).ok);
        assert!(validate_arguments(&args(json!({ "limit": -2.0 })), &schema).ok);
        assert!(!validate_arguments(&args(json!({ "limit": 5.25 })), &schema).ok);
    }

    #[test]
    fn untyped_properties_accept_anything() {
        let schema = schema(json!({ "properties": { "meta": {} }, "required": ["meta"] }));

        assert!(validate_arguments(&args(json!({ "meta": [1, 2] })), &schema).ok);
    }

    #[test]
    fn signature_ignores_argument_values() {
        let schema = schema(json!({
            "properties": { "path": { "type": "string" } },
            "required": ["path", "new_string"]
        }));

        let a = validate_arguments(&args(json!({ "path": 1 })), &schema);
        let b = validate_arguments(&args(json!({ "path": 2 })), &schema);

        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature(), "missing:new_string|type:path:string");
    }
}
