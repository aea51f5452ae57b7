//! Live feed sink.

use std::collections::VecDeque;

use log::debug;
use tokio::sync::mpsc;

use threadfeed_protocol::FeedItem;

use crate::sink::FeedSink;

/// Default bound on live feed length.
pub const DEFAULT_MAX_ITEMS: usize = 500;

/// A change published by a [`LiveFeed`].
#[derive(Debug, Clone, PartialEq)]
pub enum FeedChange {
    /// A new item was added at the end.
    Appended(FeedItem),
    /// An existing item was replaced by this value.
    Updated(FeedItem),
    /// Oldest items were dropped to respect the length bound.
    Trimmed { ids: Vec<String> },
}

/// Bounded in-memory feed backing a connected thread.
///
/// Holds at most `max_items` items (0 means unbounded) and drops the oldest
/// ones beyond that. Every mutation is published to the subscriber, if any.
#[derive(Debug)]
pub struct LiveFeed {
    items: VecDeque<FeedItem>,
    max_items: usize,
    changes: Option<mpsc::UnboundedSender<FeedChange>>,
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEMS)
    }
}

impl LiveFeed {
    pub fn new(max_items: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_items,
            changes: None,
        }
    }

    /// Start publishing changes. Replaces any earlier subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<FeedChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.changes = Some(tx);
        rx
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FeedItem> {
        self.items.iter().rev().find(|item| item.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedItem> {
        self.items.iter()
    }

    /// Copy of the current items, oldest first.
    pub fn snapshot(&self) -> Vec<FeedItem> {
        self.items.iter().cloned().collect()
    }

    fn publish(&mut self, change: FeedChange) {
        if let Some(tx) = &self.changes {
            if tx.send(change).is_err() {
                debug!("feed subscriber went away, no longer publishing");
                self.changes = None;
            }
        }
    }

    fn trim(&mut self) {
        if self.max_items == 0 || self.items.len() <= self.max_items {
            return;
        }
        let excess = self.items.len() - self.max_items;
        let ids = self.items.drain(..excess).map(|item| item.id).collect();
        self.publish(FeedChange::Trimmed { ids });
    }
}

impl FeedSink for LiveFeed {
    fn append(&mut self, item: FeedItem) {
        self.items.push_back(item.clone());
        self.publish(FeedChange::Appended(item));
        self.trim();
    }

    fn update(&mut self, id: &str, f: &mut dyn FnMut(&mut FeedItem)) {
        let Some(item) = self.items.iter_mut().rev().find(|item| item.id == id) else {
            return;
        };
        f(item);
        let updated = item.clone();
        self.publish(FeedChange::Updated(updated));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadfeed_protocol::FeedBody;

    fn log(id: &str) -> FeedItem {
        FeedItem::new(
            id,
            "ts",
            FeedBody::Log {
                line: id.to_string(),
            },
        )
    }

    #[test]
    fn test_trims_oldest() {
        let mut feed = LiveFeed::new(2);
        feed.append(log("a"));
        feed.append(log("b"));
        feed.append(log("c"));

        let ids: Vec<_> = feed.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        // Updating a trimmed item is a no-op.
        let mut called = false;
        feed.update("a", &mut |_| called = true);
        assert!(!called);
    }

    #[test]
    fn test_zero_is_unbounded() {
        let mut feed = LiveFeed::new(0);
        for i in 0..10 {
            feed.append(log(&i.to_string()));
        }
        assert_eq!(feed.len(), 10);
    }

    #[tokio::test]
    async fn test_publishes_changes() {
        let mut feed = LiveFeed::new(1);
        let mut rx = feed.subscribe();

        feed.append(log("a"));
        feed.update("a", &mut |item| item.ts = "later".to_string());
        feed.append(log("b"));

        assert_eq!(rx.recv().await, Some(FeedChange::Appended(log("a"))));
        match rx.recv().await {
            Some(FeedChange::Updated(item)) => assert_eq!(item.ts, "later"),
            other => panic!("unexpected change: {other:?}"),
        }
        assert_eq!(rx.recv().await, Some(FeedChange::Appended(log("b"))));
        assert_eq!(
            rx.recv().await,
            Some(FeedChange::Trimmed {
                ids: vec!["a".to_string()]
            })
        );
    }
}
