//! Message-count window over the conversation log for model input.
//!
//! The window keeps a leading system message, then the most recent messages
//! up to a whole-message budget. Its boundaries are adjusted so that the
//! first kept message is human-authored and the last is human- or
//! tool-authored. The persisted log is never touched: trimming produces a
//! fresh `Vec` for a single invocation.

use crate::{Message, MessageRole};

/// Default number of non-system messages sent to the model.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryTrimmer {
    max_messages: usize,
}

impl Default for HistoryTrimmer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl HistoryTrimmer {
    /// A budget of zero is treated as one.
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Build the model-input view of `messages`.
    pub fn window(&self, messages: &[Message]) -> Vec<Message> {
        let (head, rest) = match messages.split_first() {
            Some((first, rest)) if first.role == MessageRole::System => (Some(first), rest),
            _ => (None, messages),
        };

        let mut out: Vec<Message> = head.into_iter().cloned().collect();
        if let Some((start, end)) = self.bounds(rest) {
            out.extend(rest[start..=end].iter().cloned());
        }
        out
    }

    /// Inclusive `(start, end)` indices into `rest`, or `None` when empty.
    fn bounds(&self, rest: &[Message]) -> Option<(usize, usize)> {
        if rest.is_empty() {
            return None;
        }

        // Shrink from the newest end until the window ends on human/tool.
        let end = rest
            .iter()
            .rposition(|m| matches!(m.role, MessageRole::Human | MessageRole::Tool))
            .unwrap_or(rest.len() - 1);

        let mut start = (end + 1).saturating_sub(self.max_messages);

        if rest[start].role != MessageRole::Human {
            // Prefer shrinking to the first human inside the window; if there
            // is none, extend back to the nearest earlier one.
            if let Some(offset) = rest[start..=end]
                .iter()
                .position(|m| m.role == MessageRole::Human)
            {
                start += offset;
            } else if let Some(earlier) = rest[..start]
                .iter()
                .rposition(|m| m.role == MessageRole::Human)
            {
                start = earlier;
            }
        }

        Some((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;
    use serde_json::json;

    fn roles(window: &[Message]) -> Vec<MessageRole> {
        window.iter().map(|m| m.role).collect()
    }

    fn contents(window: &[Message]) -> Vec<&str> {
        window.iter().map(|m| m.content.as_str()).collect()
    }

    fn call_msg(id: &str) -> Message {
        Message::assistant_tool_calls("", vec![ToolCall::new(id, "search", json!({}))])
    }

    #[test]
    fn short_history_passes_through() {
        let log = vec![
            Message::system("sys"),
            Message::human("h1"),
            Message::assistant_text("a1"),
            Message::human("h2"),
        ];
        assert_eq!(HistoryTrimmer::new(10).window(&log), log);
    }

    #[test]
    fn keeps_system_and_most_recent() {
        let log = vec![
            Message::system("sys"),
            Message::human("h1"),
            Message::assistant_text("a1"),
            Message::human("h2"),
            Message::assistant_text("a2"),
            Message::human("h3"),
        ];
        let window = HistoryTrimmer::new(3).window(&log);
        assert_eq!(contents(&window), ["sys", "h2", "a2", "h3"]);
    }

    #[test]
    fn shrinks_start_to_first_human() {
        let log = vec![
            Message::human("h1"),
            call_msg("c1"),
            Message::tool_result("c1", "t1"),
            Message::assistant_text("a1"),
            Message::human("h2"),
            call_msg("c2"),
            Message::tool_result("c2", "t2"),
        ];
        // Budget 4 would start at "a1"; the window must begin on a human.
        let window = HistoryTrimmer::new(4).window(&log);
        assert_eq!(contents(&window), ["h2", "", "t2"]);
        assert_eq!(window.first().unwrap().role, MessageRole::Human);
        assert_eq!(window.last().unwrap().role, MessageRole::Tool);
    }

    #[test]
    fn extends_back_when_no_human_in_budget() {
        let log = vec![
            Message::human("h1"),
            call_msg("c1"),
            Message::tool_result("c1", "t1"),
            call_msg("c2"),
            Message::tool_result("c2", "t2"),
        ];
        let window = HistoryTrimmer::new(2).window(&log);
        assert_eq!(window.len(), 5);
        assert_eq!(window[0].content, "h1");
    }

    #[test]
    fn trailing_assistant_is_dropped() {
        let log = vec![
            Message::system("sys"),
            Message::human("h1"),
            Message::assistant_text("a1"),
        ];
        let window = HistoryTrimmer::new(10).window(&log);
        assert_eq!(
            roles(&window),
            [MessageRole::System, MessageRole::Human]
        );
    }

    #[test]
    fn never_mutates_input() {
        let log = vec![Message::human("h1"), Message::human("h2")];
        let before = log.clone();
        let _ = HistoryTrimmer::new(1).window(&log);
        assert_eq!(log, before);
    }

    #[test]
    fn empty_and_system_only() {
        let trimmer = HistoryTrimmer::new(5);
        assert!(trimmer.window(&[]).is_empty());
        let only = vec![Message::system("sys")];
        assert_eq!(trimmer.window(&only), only);
    }

    #[test]
    fn window_bounds_hold_across_sizes() {
        let mut log = vec![Message::system("sys")];
        for i in 0..12 {
            log.push(Message::human(format!("h{i}")));
            log.push(call_msg(&format!("c{i}")));
            log.push(Message::tool_result(format!("c{i}"), "ok"));
            log.push(Message::assistant_text(format!("a{i}")));
        }
        log.push(Message::human("last"));

        for budget in 1..=20 {
            let window = HistoryTrimmer::new(budget).window(&log);
            assert_eq!(window[0].role, MessageRole::System);
            assert_eq!(window[1].role, MessageRole::Human, "budget {budget}");
            assert!(matches!(
                window.last().unwrap().role,
                MessageRole::Human | MessageRole::Tool
            ));
            assert_eq!(window.last().unwrap().content, "last");
        }
    }
}
