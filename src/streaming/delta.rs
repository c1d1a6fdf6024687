//! Snapshot-to-delta conversion.
//!
//! The upstream agent re-sends the full accumulated text on every event.
//! Downstream consumers expect append-only chunks, so each tracker keeps the
//! previous snapshot and emits only what is new.

/// Tracks cumulative text and thinking snapshots for one logical stream.
#[derive(Debug, Clone, Default)]
pub struct DeltaTracker {
    last_text: String,
    last_thinking: String,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta between the previous text snapshot and `current`.
    pub fn next_text(&mut self, current: &str) -> String {
        let delta = snapshot_delta(&self.last_text, current).to_string();
        self.last_text = current.to_string();
        delta
    }

    /// Delta between the previous thinking snapshot and `current`.
    pub fn next_thinking(&mut self, current: &str) -> String {
        let delta = snapshot_delta(&self.last_thinking, current).to_string();
        self.last_thinking = current.to_string();
        delta
    }

    pub fn reset(&mut self) {
        self.last_text.clear();
        self.last_thinking.clear();
    }
}

/// Suffix of `current` past `previous`, or all of `current` when the
/// upstream reset or diverged.
pub fn snapshot_delta<'a>(previous: &str, current: &'a str) -> &'a str {
    if previous.is_empty() {
        return current;
    }
    current.strip_prefix(previous).unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_snapshot_is_returned_whole() {
        let mut tracker = DeltaTracker::new();
        assert_eq!(tracker.next_text("Hello"), "Hello");
    }

    #[test]
    fn extension_yields_suffix() {
        let mut tracker = DeltaTracker::new();
        tracker.next_text("Hello");
        assert_eq!(tracker.next_text("Hello world"), " world");
        assert_eq!(tracker.next_text("Hello world"), "");
    }

    #[test]
    fn divergence_yields_full_snapshot() {
        let mut tracker = DeltaTracker::new();
        tracker.next_text("Hello world");
        assert_eq!(tracker.next_text("Goodbye"), "Goodbye");
        assert_eq!(tracker.next_text("Goodbye!"), "!");
    }

    #[test]
    fn text_and_thinking_are_independent() {
        let mut tracker = DeltaTracker::new();
        assert_eq!(tracker.next_thinking("Plan"), "Plan");
        assert_eq!(tracker.next_text("Answer"), "Answer");
        assert_eq!(tracker.next_thinking("Plan more"), " more");
        assert_eq!(tracker.next_text("Answer!"), "!");
    }

    #[test]
    fn handles_multibyte_prefixes() {
        let mut tracker = DeltaTracker::new();
        tracker.next_text("héllo ");
        assert_eq!(tracker.next_text("héllo wörld"), "wörld");
    }

    #[test]
    fn reset_forgets_snapshots() {
        let mut tracker = DeltaTracker::new();
        tracker.next_text("abc");
        tracker.reset();
        assert_eq!(tracker.next_text("abcd"), "abcd");
    }

    #[test]
    fn prefix_property_holds_for_sample_pairs() {
        let pairs = [("", "x"), ("a", "ab"), ("ab", "ab"), ("abc", "abcdef"), ("é", "éé")];
        for (a, b) in pairs {
            let mut tracker = DeltaTracker::new();
            assert_eq!(tracker.next_text(a), a);
            assert_eq!(tracker.next_text(b), &b[a.len()..]);
        }
    }
}
