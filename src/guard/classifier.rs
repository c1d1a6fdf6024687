//! Heuristic classification of tool-result text.
//!
//! Substring matching is approximate: a successful result that mentions
//! "error" in its body is a false positive, a terse failure such as `ENOSPC`
//! is a false negative. Callers with better signal can plug in their own
//! [`ResultClassifier`].

use std::fmt::Debug;

pub const VALIDATION_CLASS: &str = "validation";
pub const TIMEOUT_CLASS: &str = "timeout";
pub const NOT_FOUND_CLASS: &str = "not_found";
pub const PERMISSION_CLASS: &str = "permission";
pub const EXECUTION_CLASS: &str = "execution";

/// Keyword tables, checked in order; the first hit names the class.
const KEYWORD_TABLE: &[(&str, &[&str])] = &[
    (
        VALIDATION_CLASS,
        &["invalid", "missing", "required", "schema", "expected"],
    ),
    (TIMEOUT_CLASS, &["timeout", "timed out"]),
    (NOT_FOUND_CLASS, &["not found", "no such file", "enoent"]),
    (PERMISSION_CLASS, &["permission denied", "eacces"]),
    (EXECUTION_CLASS, &["error", "failed", "exception"]),
];

/// Decides whether a tool result looks like a failure.
pub trait ResultClassifier: Send + Sync + Debug {
    /// Error class of `content`, or `None` when it looks successful.
    fn classify(&self, content: &str) -> Option<String>;
}

/// Default keyword-based classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl ResultClassifier for KeywordClassifier {
    fn classify(&self, content: &str) -> Option<String> {
        if reports_success(content) {
            return None;
        }
        let lowered = content.to_lowercase();
        KEYWORD_TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| lowered.contains(keyword)))
            .map(|(class, _)| class.to_string())
    }
}

/// `{"success": true}`-style payloads are successes regardless of wording.
fn reports_success(content: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(content.trim())
        .ok()
        .and_then(|value| value.get("success").and_then(serde_json::Value::as_bool))
        .unwrap_or(false)
}
