//! Argument compatibility: alias normalization, tool-specific repair,
//! unexpected-field stripping and validation against the declared schema.

use serde_json::{Map, Value};

use super::schema::{SchemaMap, ToolSchema};
use super::validation::{validate_arguments, ValidationResult};
use crate::types::OpenAiToolCall;

/// Known non-canonical argument keys and the property they stand for.
const ARG_ALIASES: &[(&str, &str)] = &[
    ("filePath", "path"),
    ("file_path", "path"),
    ("filename", "path"),
    ("file", "path"),
    ("contents", "content"),
    ("oldString", "old_string"),
    ("old_str", "old_string"),
    ("newString", "new_string"),
    ("new_str", "new_string"),
    ("cmd", "command"),
];

/// Full-replacement keys an `edit` call may carry instead of old/new strings.
const EDIT_CONTENT_KEYS: &[&str] = &["content", "streamContent"];

const TODO_STATUS_SYNONYMS: &[(&str, &str)] = &[
    ("todo", "pending"),
    ("in-progress", "in_progress"),
    ("done", "completed"),
];

const DEFAULT_TODO_PRIORITY: &str = "medium";

/// Outcome of [`apply_compat`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompatResult {
    /// The call with re-serialized, normalized arguments.
    pub tool_call: OpenAiToolCall,
    pub normalized_args: Map<String, Value>,
    /// Alias keys dropped because their canonical key was also present.
    pub collision_keys: Vec<String>,
    pub validation: ValidationResult,
}

/// Normalize, repair and validate `call` against its declared schema.
///
/// Tools without a schema are returned untouched with a passing validation.
pub fn apply_compat(call: &OpenAiToolCall, schemas: &SchemaMap) -> CompatResult {
    let parsed = match call.parsed_arguments() {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let Some(schema) = schemas.get(call.name()) else {
        return CompatResult {
            tool_call: call.clone(),
            normalized_args: parsed,
            collision_keys: Vec::new(),
            validation: ValidationResult::pass(),
        };
    };

    let mut args = parsed;
    let collision_keys = normalize_aliases(&mut args, schema);
    match call.name() {
        "edit" => repair_edit(&mut args, schema),
        "todowrite" => repair_todos(&mut args),
        _ => {}
    }
    let unexpected = strip_unexpected(&mut args, schema);

    let mut validation = validate_arguments(&args, schema);
    validation.unexpected = unexpected;

    let mut tool_call = call.clone();
    tool_call.function.arguments = Value::Object(args.clone()).to_string();

    CompatResult {
        tool_call,
        normalized_args: args,
        collision_keys,
        validation,
    }
}

/// Rename alias keys to declared canonical keys; returns dropped collisions.
fn normalize_aliases(args: &mut Map<String, Value>, schema: &ToolSchema) -> Vec<String> {
    let mut collisions = Vec::new();
    for (alias, canonical) in ARG_ALIASES {
        if !args.contains_key(*alias)
            || schema.has_property(alias)
            || !schema.has_property(canonical)
        {
            continue;
        }
        let Some(value) = args.remove(*alias) else {
            continue;
        };
        if args.contains_key(*canonical) {
            tracing::debug!(alias = *alias, canonical = *canonical, "dropping alias that collides with canonical key");
            collisions.push(alias.to_string());
        } else {
            args.insert(canonical.to_string(), value);
        }
    }
    collisions
}

/// Turn a full-replacement `content`/`streamContent` payload into an
/// `old_string`/`new_string` pair when the schema wants the latter.
fn repair_edit(args: &mut Map<String, Value>, schema: &ToolSchema) {
    if !schema.requires("old_string") || !schema.requires("new_string") {
        return;
    }
    if args.contains_key("old_string") || args.contains_key("new_string") {
        return;
    }
    let Some(text) = EDIT_CONTENT_KEYS
        .iter()
        .find_map(|key| args.get(*key).and_then(coerce_text))
    else {
        return;
    };

    for key in EDIT_CONTENT_KEYS {
        args.remove(*key);
    }
    args.insert("old_string".to_string(), Value::String(String::new()));
    args.insert("new_string".to_string(), Value::String(text));
    tracing::debug!("repaired edit call from full-replacement content");
}

/// Flatten a string, a `{text}`/`{content}` object, or an array of either.
pub(crate) fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(_) => text_field(value).map(str::to_string),
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Value::String(text) => Some(text.as_str()),
                Value::Object(_) => text_field(item),
                _ => None,
            })
            .collect::<Option<Vec<&str>>>()
            .map(|chunks| chunks.concat()),
        _ => None,
    }
}

fn text_field(value: &Value) -> Option<&str> {
    value
        .get("text")
        .and_then(Value::as_str)
        .or_else(|| value.get("content").and_then(Value::as_str))
}

fn repair_todos(args: &mut Map<String, Value>) {
    let Some(Value::Array(todos)) = args.get_mut("todos") else {
        return;
    };
    for todo in todos.iter_mut().filter_map(Value::as_object_mut) {
        let canonical = todo
            .get("status")
            .and_then(Value::as_str)
            .and_then(|status| {
                TODO_STATUS_SYNONYMS
                    .iter()
                    .find(|(synonym, _)| *synonym == status)
                    .map(|(_, canonical)| *canonical)
            });
        if let Some(canonical) = canonical {
            todo.insert("status".to_string(), Value::String(canonical.to_string()));
        }
        if !todo.contains_key("priority") {
            todo.insert(
                "priority".to_string(),
                Value::String(DEFAULT_TODO_PRIORITY.to_string()),
            );
        }
    }
}

fn strip_unexpected(args: &mut Map<String, Value>, schema: &ToolSchema) -> Vec<String> {
    if schema.additional_properties {
        return Vec::new();
    }
    let unexpected: Vec<String> = args
        .keys()
        .filter(|key| !schema.has_property(key))
        .cloned()
        .collect();
    for key in &unexpected {
        args.remove(key);
    }
    unexpected
}
