//! Stuck-loop detection

use tracing::warn;

use crate::memory::Memory;

pub const STUCK_NOTE: &str = "Observed duplicate responses. Consider new strategies \
and avoid repeating ineffective paths already attempted.";

/// Detects an agent repeating itself and nudges the next think.
///
/// The check runs after every step. When the newest assistant text already
/// appeared `threshold` times earlier, a one-shot note is placed in memory.
/// The step right after a firing is skipped, so the note is never applied
/// twice in a row.
#[derive(Debug, Clone)]
pub struct StuckMonitor {
    threshold: usize,
    last_checked: Option<u64>,
    cooling_down: bool,
}

impl StuckMonitor {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            last_checked: None,
            cooling_down: false,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether the newest assistant message repeats earlier ones
    pub fn is_stuck(&self, memory: &Memory) -> bool {
        let Some((_, latest)) = memory.latest_assistant() else {
            return false;
        };
        let text = latest.text();
        if text.is_empty() {
            return false;
        }

        let duplicates = memory
            .assistant_texts()
            .rev()
            .skip(1)
            .filter(|t| *t == text)
            .count();
        duplicates >= self.threshold
    }

    /// Run after a step. Returns true when a note was injected.
    pub fn check(&mut self, memory: &mut Memory) -> bool {
        if self.cooling_down {
            self.cooling_down = false;
            return false;
        }

        // Only a fresh assistant message counts as new evidence.
        let seq = memory.latest_assistant().map(|(seq, _)| seq);
        if seq.is_none() || seq == self.last_checked {
            return false;
        }
        self.last_checked = seq;

        if !self.is_stuck(memory) {
            return false;
        }

        warn!("Agent detected stuck state, injecting corrective note");
        memory.inject_note(STUCK_NOTE);
        self.cooling_down = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ravel_provider::Message;

    fn memory_with(texts: &[&str]) -> Memory {
        let mut memory = Memory::new();
        memory.append(Message::user("task"));
        for t in texts {
            memory.append(Message::assistant(*t));
        }
        memory
    }

    #[test]
    fn test_below_threshold_not_stuck() {
        let monitor = StuckMonitor::new(2);
        assert!(!monitor.is_stuck(&memory_with(&["same", "same"])));
    }

    #[test]
    fn test_threshold_met_is_stuck() {
        let monitor = StuckMonitor::new(2);
        assert!(monitor.is_stuck(&memory_with(&["same", "same", "same"])));
    }

    #[test]
    fn test_empty_text_never_stuck() {
        let monitor = StuckMonitor::new(1);
        assert!(!monitor.is_stuck(&memory_with(&["", "", ""])));
    }

    #[test]
    fn test_distinct_texts_not_stuck() {
        let monitor = StuckMonitor::new(1);
        assert!(!monitor.is_stuck(&memory_with(&["a", "b", "c"])));
    }

    #[test]
    fn test_check_injects_then_cools_down() {
        let mut monitor = StuckMonitor::new(2);
        let mut memory = memory_with(&["same", "same", "same"]);

        assert!(monitor.check(&mut memory));
        assert!(memory.pending_note().is_some());
        memory.consume_note();

        // The next step repeats again but falls in the cooldown.
        memory.append(Message::assistant("same"));
        assert!(!monitor.check(&mut memory));
        assert!(memory.pending_note().is_none());

        // Persisting repetition fires again afterwards.
        memory.append(Message::assistant("same"));
        assert!(monitor.check(&mut memory));
    }

    #[test]
    fn test_check_ignores_steps_without_new_assistant_message() {
        let mut monitor = StuckMonitor::new(1);
        let mut memory = memory_with(&["x", "y"]);
        assert!(!monitor.check(&mut memory));

        memory.append(Message::user("observation"));
        assert!(!monitor.check(&mut memory));
    }
}
