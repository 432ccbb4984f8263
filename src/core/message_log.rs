use crate::core::buffer::BoundedBuffer;
use crate::core::message::{MessageQuery, TerminalMessage};

/// Bounded, ordered history of exchanged messages
#[derive(Debug, Clone)]
pub struct MessageLog {
    messages: BoundedBuffer<TerminalMessage>,
    active_filter: Option<MessageQuery>,
}

impl MessageLog {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(capacity: usize) -> Self {
        Self {
            messages: BoundedBuffer::new(capacity),
            active_filter: None,
        }
    }

    /// Append at the tail, evicting the oldest entries past capacity.
    /// Returns the number of evicted messages.
    pub fn append(&mut self, message: TerminalMessage) -> usize {
        self.messages.push(message)
    }

    /// Messages whose content contains `query`, in log order. An empty
    /// query returns the whole log.
    pub fn filter(&self, query: &str, case_sensitive: bool) -> Vec<TerminalMessage> {
        self.query(&MessageQuery::search(query, case_sensitive))
    }

    /// Messages accepted by `query`, in log order, trimmed to its limit
    pub fn query(&self, query: &MessageQuery) -> Vec<TerminalMessage> {
        let mut matched: Vec<TerminalMessage> = self
            .messages
            .iter()
            .filter(|message| query.matches(message))
            .cloned()
            .collect();

        if let Some(limit) = query.limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }
        matched
    }

    pub fn set_filter(&mut self, filter: Option<MessageQuery>) {
        self.active_filter = filter;
    }

    pub fn active_filter(&self) -> Option<&MessageQuery> {
        self.active_filter.as_ref()
    }

    /// Messages passing the active filter, or everything if none is set
    pub fn visible(&self) -> Vec<TerminalMessage> {
        match &self.active_filter {
            Some(filter) => self.query(filter),
            None => self.snapshot(),
        }
    }

    /// Empty the log and drop the active filter
    pub fn clear(&mut self) {
        self.messages.clear();
        self.active_filter = None;
    }

    pub fn snapshot(&self) -> Vec<TerminalMessage> {
        self.messages.to_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TerminalMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.messages.capacity()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::InputMode;
    use crate::core::message::MessageDirection;

    fn received(text: &str) -> TerminalMessage {
        TerminalMessage::received(text.as_bytes().to_vec())
    }

    fn contents(messages: &[TerminalMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_capacity_three_keeps_last_three() {
        let mut log = MessageLog::new(3);
        for text in ["A", "B", "C", "D", "E"] {
            log.append(received(text));
        }

        assert_eq!(contents(&log.snapshot()), vec!["C", "D", "E"]);
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(MessageLog::default().capacity(), 1000);
    }

    #[test]
    fn test_filter_empty_query_returns_everything() {
        let mut log = MessageLog::default();
        log.append(received("alpha"));
        log.append(received("beta"));

        assert_eq!(log.filter("", false).len(), 2);
        assert_eq!(log.filter("", true).len(), 2);
    }

    #[test]
    fn test_filter_case_handling() {
        let mut log = MessageLog::default();
        log.append(received("ERROR: overheat"));
        log.append(received("ok"));
        log.append(received("minor error"));

        assert_eq!(
            contents(&log.filter("error", false)),
            vec!["ERROR: overheat", "minor error"]
        );
        assert_eq!(contents(&log.filter("error", true)), vec!["minor error"]);
    }

    #[test]
    fn test_query_direction_and_limit() {
        let mut log = MessageLog::default();
        log.append(TerminalMessage::sent(b"ping 1".to_vec(), InputMode::Text));
        log.append(received("pong 1"));
        log.append(TerminalMessage::sent(b"ping 2".to_vec(), InputMode::Text));
        log.append(received("pong 2"));
        log.append(received("pong 3"));

        let query = MessageQuery::new()
            .with_direction(MessageDirection::Received)
            .with_limit(2);
        assert_eq!(contents(&log.query(&query)), vec!["pong 2", "pong 3"]);
    }

    #[test]
    fn test_clear_resets_filter() {
        let mut log = MessageLog::default();
        log.append(received("one"));
        log.append(received("two"));
        log.set_filter(Some(MessageQuery::search("one", false)));
        assert_eq!(contents(&log.visible()), vec!["one"]);

        log.clear();
        assert!(log.is_empty());
        assert!(log.active_filter().is_none());

        log.append(received("three"));
        assert_eq!(contents(&log.visible()), vec!["three"]);
    }
}
