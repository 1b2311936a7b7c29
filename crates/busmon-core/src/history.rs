//! Consumer-side message history.
//!
//! The engine only appends; the consumer may clear at any time. Lookups by
//! serial let a front end pair method calls with their returns and errors.

use std::collections::VecDeque;

use crate::{MessageKind, MonitoredMessage};

/// Ordered list of monitored messages, oldest first.
///
/// Optionally bounded: once `capacity` messages are held, each push evicts
/// the oldest one.
#[derive(Debug, Clone, Default)]
pub struct MessageHistory {
    messages: VecDeque<MonitoredMessage>,
    capacity: Option<usize>,
}

impl MessageHistory {
    /// Creates an unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a history that keeps at most `capacity` messages.
    ///
    /// A capacity of zero is treated as one.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Appends a message, evicting the oldest if the history is full.
    pub fn push(&mut self, message: MonitoredMessage) {
        if let Some(capacity) = self.capacity {
            while self.messages.len() >= capacity {
                self.messages.pop_front();
            }
        }
        self.messages.push_back(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MonitoredMessage> {
        self.messages.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MonitoredMessage> {
        self.messages.iter()
    }

    /// Index of the first message with the given serial.
    pub fn find_serial(&self, serial: u32) -> Option<usize> {
        self.messages.iter().position(|m| m.serial == serial)
    }

    /// Index of the first message whose reply serial equals `serial`.
    pub fn find_reply_serial(&self, serial: u32) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.reply_serial() == Some(serial))
    }

    /// The method call that `reply` answers, searching newest first.
    pub fn call_for(&self, reply: &MonitoredMessage) -> Option<&MonitoredMessage> {
        if !matches!(reply.kind(), MessageKind::MethodReturn | MessageKind::Error) {
            return None;
        }
        self.messages.iter().rev().find(|m| reply.answers(m))
    }
}

impl Extend<MonitoredMessage> for MessageHistory {
    fn extend<T: IntoIterator<Item = MonitoredMessage>>(&mut self, iter: T) {
        for message in iter {
            self.push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PeerIdentity, Routing};
    use chrono::Utc;

    fn call(serial: u32, sender: &str) -> MonitoredMessage {
        MonitoredMessage {
            timestamp: Utc::now(),
            serial,
            routing: Routing::MethodCall {
                path: "/".to_string(),
                interface: None,
                member: "Get".to_string(),
            },
            sender: PeerIdentity::from_address(sender),
            destination: PeerIdentity::from_address(":1.1"),
            arguments: None,
        }
    }

    fn reply(serial: u32, reply_serial: u32, destination: &str) -> MonitoredMessage {
        MonitoredMessage {
            timestamp: Utc::now(),
            serial,
            routing: Routing::MethodReturn { reply_serial },
            sender: PeerIdentity::from_address(":1.1"),
            destination: PeerIdentity::from_address(destination),
            arguments: None,
        }
    }

    #[test]
    fn test_push_and_clear() {
        let mut history = MessageHistory::new();
        assert!(history.is_empty());

        history.push(call(1, ":1.5"));
        history.push(call(2, ":1.5"));
        assert_eq!(history.len(), 2);
        assert_eq!(history.get(1).map(|m| m.serial), Some(2));

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_find_serials() {
        let mut history = MessageHistory::new();
        history.extend([call(7, ":1.5"), reply(3, 7, ":1.5")]);

        assert_eq!(history.find_serial(7), Some(0));
        assert_eq!(history.find_reply_serial(7), Some(1));
        assert_eq!(history.find_serial(99), None);
        assert_eq!(history.find_reply_serial(3), None);
    }

    #[test]
    fn test_call_for_matches_peer() {
        let mut history = MessageHistory::new();
        history.push(call(7, ":1.5"));
        history.push(call(7, ":1.6"));

        let answer = reply(40, 7, ":1.5");
        let found = history.call_for(&answer).expect("call should be found");
        assert_eq!(found.sender.address, ":1.5");

        let orphan = reply(41, 7, ":1.9");
        assert!(history.call_for(&orphan).is_none());

        // Calls are never answers
        assert!(history.call_for(&call(7, ":1.1")).is_none());
    }

    #[test]
    fn test_bounded_evicts_oldest() {
        let mut history = MessageHistory::bounded(2);
        history.extend([call(1, ":1.5"), call(2, ":1.5"), call(3, ":1.5")]);

        assert_eq!(history.len(), 2);
        let serials: Vec<u32> = history.iter().map(|m| m.serial).collect();
        assert_eq!(serials, vec![2, 3]);
    }

    #[test]
    fn test_bounded_zero_keeps_one() {
        let mut history = MessageHistory::bounded(0);
        history.extend([call(1, ":1.5"), call(2, ":1.5")]);
        assert_eq!(history.len(), 1);
        assert_eq!(history.find_serial(2), Some(0));
    }
}
