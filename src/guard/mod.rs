//! Loop guard: stops a turn when the same tool failure keeps recurring.
//!
//! Failures are grouped by fingerprint `tool|class`. Argument values are not
//! part of the fingerprint, so cosmetically different malformed payloads for
//! the same defect accumulate against one counter.

pub mod classifier;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use classifier::{KeywordClassifier, ResultClassifier, VALIDATION_CLASS};

use crate::tools::{apply_compat, SchemaMap};
use crate::types::{ChatMessage, OpenAiToolCall, Role};

/// Repeat threshold used when none (or an invalid one) is configured.
pub const DEFAULT_MAX_REPEAT: usize = 3;

const SUCCESS_CLASS: &str = "success";

/// Parsed max-repeat setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxRepeat {
    pub value: usize,
    /// False when a configured value was rejected in favor of the default.
    pub valid: bool,
}

/// Parse a configured max-repeat value; non-positive or non-numeric input
/// falls back to [`DEFAULT_MAX_REPEAT`].
pub fn parse_max_repeat(raw: Option<&str>) -> MaxRepeat {
    let Some(raw) = raw else {
        return MaxRepeat {
            value: DEFAULT_MAX_REPEAT,
            valid: true,
        };
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => MaxRepeat { value, valid: true },
        _ => MaxRepeat {
            value: DEFAULT_MAX_REPEAT,
            valid: false,
        },
    }
}

/// Outcome of one guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopGuardDecision {
    pub triggered: bool,
    pub repeat_count: usize,
    pub max_repeat: usize,
    pub fingerprint: String,
    /// False when the associated result looked successful and nothing was counted.
    pub tracked: bool,
    pub error_class: Option<String>,
    pub tool_name: String,
}

/// Session-scoped failure counters.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    max_repeat: usize,
    counts: HashMap<String, usize>,
    /// Error class of each prior tool result by call id; `None` means success.
    results_by_call: HashMap<String, Option<String>>,
    latest_result: Option<String>,
    classifier: Arc<dyn ResultClassifier>,
}

impl LoopGuard {
    /// Empty guard with the keyword classifier. A `max_repeat` of 0 falls
    /// back to [`DEFAULT_MAX_REPEAT`].
    pub fn new(max_repeat: usize) -> Self {
        let max_repeat = if max_repeat == 0 {
            tracing::warn!(default = DEFAULT_MAX_REPEAT, "max_repeat must be positive; using default");
            DEFAULT_MAX_REPEAT
        } else {
            max_repeat
        };
        Self {
            max_repeat,
            counts: HashMap::new(),
            results_by_call: HashMap::new(),
            latest_result: None,
            classifier: Arc::new(KeywordClassifier),
        }
    }

    /// Guard seeded from prior conversation turns.
    pub fn from_history(history: &[ChatMessage], max_repeat: usize, schemas: &SchemaMap) -> Self {
        Self::new(max_repeat).seeded(history, schemas)
    }

    /// Replace the result classifier. Call before seeding.
    pub fn with_classifier(mut self, classifier: Arc<dyn ResultClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Seed counters from `history`.
    ///
    /// An error-like tool result paired with an earlier assistant call counts
    /// once against that call's `tool|class`. An assistant call with no result
    /// whose arguments are malformed counts once against `tool|validation`.
    pub fn seeded(mut self, history: &[ChatMessage], schemas: &SchemaMap) -> Self {
        let calls: HashMap<&str, &OpenAiToolCall> = history
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .flat_map(|message| message.tool_calls.iter())
            .map(|call| (call.id.as_str(), call))
            .collect();
        let mut answered: HashSet<&str> = HashSet::new();

        for message in history.iter().filter(|message| message.is_tool_result()) {
            let class = self.classifier.classify(&message.text_content());
            self.latest_result = class.clone();

            let Some(call_id) = message.tool_call_id.as_deref() else {
                continue;
            };
            answered.insert(call_id);
            self.results_by_call.insert(call_id.to_string(), class.clone());

            if let (Some(class), Some(call)) = (class, calls.get(call_id)) {
                *self
                    .counts
                    .entry(fingerprint(call.name(), &class))
                    .or_default() += 1;
            }
        }

        for call in history
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .flat_map(|message| message.tool_calls.iter())
            .filter(|call| !answered.contains(call.id.as_str()))
        {
            if is_malformed(call, schemas) {
                *self
                    .counts
                    .entry(fingerprint(call.name(), VALIDATION_CLASS))
                    .or_default() += 1;
            }
        }

        tracing::debug!(fingerprints = self.counts.len(), "loop guard seeded from history");
        self
    }

    pub fn max_repeat(&self) -> usize {
        self.max_repeat
    }

    /// Current count for `fingerprint`.
    pub fn count(&self, fingerprint: &str) -> usize {
        self.counts.get(fingerprint).copied().unwrap_or(0)
    }

    /// Count a failure of `call`, classified from its result in history (or
    /// the most recent result when the call has none).
    pub fn evaluate(&mut self, call: &OpenAiToolCall) -> LoopGuardDecision {
        let class = match self.results_by_call.get(&call.id) {
            Some(class) => class.clone(),
            None => self.latest_result.clone(),
        };
        match class {
            Some(class) => self.record(call.name(), &class),
            None => LoopGuardDecision {
                triggered: false,
                repeat_count: 0,
                max_repeat: self.max_repeat,
                fingerprint: fingerprint(call.name(), SUCCESS_CLASS),
                tracked: false,
                error_class: None,
                tool_name: call.name().to_string(),
            },
        }
    }

    /// Count a schema-validation failure of `call`.
    ///
    /// `signature` describes the failure for logging; it is not part of the
    /// fingerprint.
    pub fn evaluate_validation(&mut self, call: &OpenAiToolCall, signature: &str) -> LoopGuardDecision {
        tracing::debug!(tool = call.name(), signature, "counting validation failure");
        self.record(call.name(), VALIDATION_CLASS)
    }

    /// Zero the counter for `fingerprint`.
    pub fn reset_fingerprint(&mut self, fingerprint: &str) {
        self.counts.remove(fingerprint);
    }

    fn record(&mut self, tool_name: &str, class: &str) -> LoopGuardDecision {
        let fingerprint = fingerprint(tool_name, class);
        let count = self.counts.entry(fingerprint.clone()).or_default();
        *count += 1;
        let repeat_count = *count;
        let triggered = repeat_count > self.max_repeat;

        if triggered {
            tracing::warn!(
                fingerprint = %fingerprint,
                repeat_count,
                max_repeat = self.max_repeat,
                "tool loop guard triggered"
            );
        }

        LoopGuardDecision {
            triggered,
            repeat_count,
            max_repeat: self.max_repeat,
            fingerprint,
            tracked: true,
            error_class: Some(class.to_string()),
            tool_name: tool_name.to_string(),
        }
    }
}

fn fingerprint(tool_name: &str, class: &str) -> String {
    format!("{tool_name}|{class}")
}

/// Whether a prior call's arguments would fail validation.
fn is_malformed(call: &OpenAiToolCall, schemas: &SchemaMap) -> bool {
    if schemas.contains_key(call.name()) {
        return !apply_compat(call, schemas).validation.ok;
    }
    let Some(Value::Object(args)) = call.parsed_arguments() else {
        return true;
    };
    call.name() == "edit"
        && (args.contains_key("content") || args.contains_key("streamContent"))
        && !args.contains_key("old_string")
        && !args.contains_key("new_string")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_max_repeat_with_default_fallback() {
        assert_eq!(parse_max_repeat(None), MaxRepeat { value: 3, valid: true });
        assert_eq!(parse_max_repeat(Some("4")), MaxRepeat { value: 4, valid: true });
        assert_eq!(parse_max_repeat(Some("0")), MaxRepeat { value: 3, valid: false });
        assert_eq!(parse_max_repeat(Some("-2")), MaxRepeat { value: 3, valid: false });
        assert_eq!(parse_max_repeat(Some("abc")), MaxRepeat { value: 3, valid: false });
    }

    #[test]
    fn zero_max_repeat_falls_back_to_default() {
        assert_eq!(LoopGuard::new(0).max_repeat(), DEFAULT_MAX_REPEAT);
        assert_eq!(LoopGuard::new(1).max_repeat(), 1);
    }

    #[test]
    fn unparseable_prior_arguments_count_as_malformed() {
        let call = OpenAiToolCall::new("c1", "read", "{\"path\":");
        assert!(is_malformed(&call, &SchemaMap::new()));

        let fine = OpenAiToolCall::new("c2", "edit", r#"{"path":"a","old_string":"x","new_string":"y"}"#);
        assert!(!is_malformed(&fine, &SchemaMap::new()));
    }

    #[test]
    fn empty_history_leaves_evaluate_untracked() {
        let mut guard = LoopGuard::new(2);
        let decision = guard.evaluate(&OpenAiToolCall::new("c1", "read", "{}"));

        assert!(!decision.tracked);
        assert_eq!(decision.repeat_count, 0);
        assert_eq!(guard.count("read|success"), 0);
    }

    #[test]
    fn paired_error_result_seeds_its_tool() {
        let history = vec![
            ChatMessage::assistant_tool_calls(vec![OpenAiToolCall::new("c1", "bash", r#"{"command":"ls"}"#)]),
            ChatMessage::tool_result("c1", "Permission denied"),
        ];

        let guard = LoopGuard::from_history(&history, 3, &SchemaMap::new());

        assert_eq!(guard.count("bash|permission"), 1);
    }
}
