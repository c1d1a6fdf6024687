//! NDJSON line parser for upstream agent output.

use crate::types::StreamEvent;

/// Parse one line of upstream output into a typed event.
///
/// Blank lines, invalid JSON, non-object roots, and objects with an unknown
/// or malformed `type` all yield `None`. This never fails.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed.starts_with('{') {
        tracing::trace!("skipping non-object line");
        return None;
    }

    // Decode straight from the text so tool-call keys keep their upstream order.
    match serde_json::from_str(trimmed) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::trace!(error = %e, category = ?e.classify(), "skipping unrecognized line");
            None
        }
    }
}
