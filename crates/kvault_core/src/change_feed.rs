//! Change feed for observing vault mutations.
//!
//! The feed emits the key name whose value changed. Consumers (reactive
//! bindings, sync layers) subscribe and receive every subsequent event;
//! a `clear` emits one event per key that was known at the time.

use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The key was written (created or updated).
    Write,
    /// The key was removed.
    Remove,
}

/// A single change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Logical name of the key that changed.
    pub key: String,
    /// Type of change.
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Creates a write event.
    pub fn write(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: ChangeKind::Write,
        }
    }

    /// Creates a remove event.
    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: ChangeKind::Remove,
        }
    }
}

/// Distributes change events to subscribers.
///
/// Disconnected subscribers are pruned on the next emit.
#[derive(Default)]
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
}

impl ChangeFeed {
    /// Creates a new change feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the feed.
    ///
    /// Returns a receiver that will see all future change events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits one event to all subscribers.
    pub fn emit(&self, event: ChangeEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Emits a batch of events in order.
    pub fn emit_all(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn emit_and_receive() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();

        feed.emit(ChangeEvent::write("counter"));

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received, ChangeEvent::write("counter"));
    }

    #[test]
    fn multiple_subscribers() {
        let feed = ChangeFeed::new();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();

        feed.emit(ChangeEvent::remove("stale"));

        assert_eq!(rx1.recv().unwrap().kind, ChangeKind::Remove);
        assert_eq!(rx2.recv().unwrap().kind, ChangeKind::Remove);
    }

    #[test]
    fn disconnected_subscriber_pruned() {
        let feed = ChangeFeed::new();
        assert_eq!(feed.subscriber_count(), 0);

        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);
        drop(rx);

        feed.emit(ChangeEvent::write("x"));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn batch_preserves_order() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();

        feed.emit_all(vec![
            ChangeEvent::remove("a"),
            ChangeEvent::remove("b"),
            ChangeEvent::remove("c"),
        ]);

        let keys: Vec<String> = (0..3).map(|_| rx.recv().unwrap().key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
