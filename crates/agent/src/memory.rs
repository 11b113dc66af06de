//! Conversation memory

use ravel_provider::{Message, Role};
use tracing::debug;

/// Ordered log of conversation messages owned by one agent.
///
/// Messages are never edited once appended. When a cap is set, the oldest
/// messages are evicted first; a leading system message is always kept.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    messages: Vec<Message>,
    max_messages: Option<usize>,
    /// Total messages ever appended, including evicted ones
    appended: u64,
    note: Option<String>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_messages(max_messages: Option<usize>) -> Self {
        Self {
            max_messages: max_messages.filter(|m| *m > 0),
            ..Self::default()
        }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.appended += 1;
        self.evict();
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.append(message);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The last `k` messages (fewer if memory is shorter)
    pub fn last_n(&self, k: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(k);
        &self.messages[start..]
    }

    /// Context handed to the model: every message in order, followed by the
    /// pending corrective note if one is set.
    pub fn to_context(&self) -> Vec<Message> {
        let mut context = self.messages.clone();
        if let Some(note) = &self.note {
            context.push(Message::system(note.clone()));
        }
        context
    }

    /// Set a one-shot note shown on the next `to_context()`
    pub fn inject_note(&mut self, note: impl Into<String>) {
        self.note = Some(note.into());
    }

    pub fn pending_note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Mark the pending note as used
    pub fn consume_note(&mut self) -> Option<String> {
        self.note.take()
    }

    /// Latest assistant message with its absolute sequence number
    pub fn latest_assistant(&self) -> Option<(u64, &Message)> {
        let base = self.appended - self.messages.len() as u64;
        self.messages
            .iter()
            .enumerate()
            .rev()
            .find(|(_, m)| m.role == Role::Assistant)
            .map(|(i, m)| (base + i as u64, m))
    }

    /// Texts of every assistant message, oldest first
    pub fn assistant_texts(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(Message::text)
    }

    fn evict(&mut self) {
        let Some(max) = self.max_messages else {
            return;
        };

        let floor = match self.messages.first() {
            Some(m) if m.role == Role::System => 1,
            _ => 0,
        };
        let mut drop = 0;
        if self.messages.len() > max {
            // Plain eviction keeps the pinned system message and the newest
            // message.
            let removable = self.messages.len().saturating_sub(floor + 1);
            drop = (self.messages.len() - max).min(removable);
        }

        // A tool result is meaningless without the assistant turn that
        // requested it, even when it is the newest message.
        while floor + drop < self.messages.len()
            && self.messages[floor + drop].role == Role::Tool
        {
            drop += 1;
        }

        if drop > 0 {
            self.messages.drain(floor..floor + drop);
            debug!("Evicted {} message(s) from memory", drop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ravel_provider::ToolCall;
    use serde_json::json;

    #[test]
    fn test_append_preserves_order() {
        let mut memory = Memory::new();
        memory.append(Message::system("sys"));
        memory.append(Message::user("hi"));
        memory.append(Message::assistant("hello"));

        let roles: Vec<Role> = memory.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(memory.len(), 3);
    }

    #[test]
    fn test_last_n() {
        let mut memory = Memory::new();
        for i in 0..5 {
            memory.append(Message::user(format!("m{i}")));
        }
        let last = memory.last_n(2);
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].text(), "m3");
        assert_eq!(last[1].text(), "m4");
        assert_eq!(memory.last_n(10).len(), 5);
        assert!(memory.last_n(0).is_empty());
    }

    #[test]
    fn test_eviction_keeps_system_message() {
        let mut memory = Memory::with_max_messages(Some(3));
        memory.append(Message::system("sys"));
        for i in 0..5 {
            memory.append(Message::user(format!("u{i}")));
        }
        assert_eq!(memory.len(), 3);
        assert_eq!(memory.messages()[0].text(), "sys");
        assert_eq!(memory.messages()[1].text(), "u3");
        assert_eq!(memory.messages()[2].text(), "u4");
    }

    #[test]
    fn test_eviction_without_system_message() {
        let mut memory = Memory::with_max_messages(Some(2));
        for i in 0..4 {
            memory.append(Message::user(format!("u{i}")));
        }
        let texts: Vec<&str> = memory.messages().iter().map(Message::text).collect();
        assert_eq!(texts, vec!["u2", "u3"]);
    }

    #[test]
    fn test_eviction_drops_orphaned_tool_results() {
        let mut memory = Memory::with_max_messages(Some(4));
        memory.append(Message::system("sys"));
        memory.append(Message::assistant_with_tool_calls(
            None,
            vec![
                ToolCall::new("a", "exec", json!({})),
                ToolCall::new("b", "exec", json!({})),
            ],
        ));
        memory.append(Message::tool("a", "exec", "one"));
        memory.append(Message::tool("b", "exec", "two"));
        memory.append(Message::assistant("done"));

        let roles: Vec<Role> = memory.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Assistant]);
        assert_eq!(memory.messages()[1].text(), "done");
    }

    #[test]
    fn test_eviction_drops_tool_results_of_an_evicted_batch() {
        let mut memory = Memory::with_max_messages(Some(2));
        memory.append(Message::system("sys"));
        memory.append(Message::assistant_with_tool_calls(
            None,
            vec![
                ToolCall::new("a", "exec", json!({})),
                ToolCall::new("b", "exec", json!({})),
            ],
        ));
        memory.append(Message::tool("a", "exec", "one"));

        let roles: Vec<Role> = memory.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System]);

        memory.append(Message::tool("b", "exec", "two"));
        assert_eq!(memory.len(), 1);

        memory.append(Message::user("next"));
        let roles: Vec<Role> = memory.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
    }

    #[test]
    fn test_zero_cap_means_unbounded() {
        let mut memory = Memory::with_max_messages(Some(0));
        for i in 0..10 {
            memory.append(Message::user(format!("u{i}")));
        }
        assert_eq!(memory.len(), 10);
    }

    #[test]
    fn test_note_is_one_shot() {
        let mut memory = Memory::new();
        memory.append(Message::user("task"));
        memory.inject_note("change strategy");

        let context = memory.to_context();
        assert_eq!(context.len(), 2);
        assert_eq!(context[1].role, Role::System);
        assert_eq!(context[1].text(), "change strategy");
        // The note is never part of the stored log.
        assert_eq!(memory.len(), 1);

        assert_eq!(memory.consume_note().as_deref(), Some("change strategy"));
        assert_eq!(memory.to_context().len(), 1);
        assert!(memory.consume_note().is_none());
    }

    #[test]
    fn test_latest_assistant_sequence_survives_eviction() {
        let mut memory = Memory::with_max_messages(Some(2));
        memory.append(Message::user("u0"));
        memory.append(Message::assistant("a1"));
        memory.append(Message::user("u2"));
        memory.append(Message::assistant("a3"));

        let (seq, msg) = memory.latest_assistant().unwrap();
        assert_eq!(seq, 3);
        assert_eq!(msg.text(), "a3");
    }
}
