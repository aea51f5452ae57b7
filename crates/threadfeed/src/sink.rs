//! Feed sink abstraction.
//!
//! The reducer only ever appends items or mutates an item by id. Keeping that
//! capability behind [`FeedSink`] lets one reducer drive both the live feed of
//! a connected thread and the plain list built during transcript replay.

use threadfeed_protocol::FeedItem;

/// Append/update capability over an ordered collection of feed items.
pub trait FeedSink {
    /// Add a new item at the end of the feed.
    fn append(&mut self, item: FeedItem);

    /// Mutate the item with `id` in place. Unknown ids are a silent no-op.
    fn update(&mut self, id: &str, f: &mut dyn FnMut(&mut FeedItem));
}

/// Plain growable list, used for transcript replay.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    items: Vec<FeedItem>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<FeedItem> {
        self.items
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
}

impl FeedSink for VecSink {
    fn append(&mut self, item: FeedItem) {
        self.items.push(item);
    }

    fn update(&mut self, id: &str, f: &mut dyn FnMut(&mut FeedItem)) {
        // Updates almost always target recent items.
        if let Some(idx) = self.items.iter().rposition(|item| item.id == id) {
            f(&mut self.items[idx]);
        }
    }
}
