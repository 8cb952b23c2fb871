use std::collections::BTreeMap;

use super::{CaptureFrameDesc, OrderKey};

/// Pending frames of one composite cycle, at most one per source.
///
/// Iterates in ascending key order regardless of arrival order.
#[derive(Debug, Default)]
pub struct FrameBatch {
    entries: BTreeMap<OrderKey, CaptureFrameDesc>,
}

impl FrameBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `frame` for `key`. Returns true if it replaced a pending frame.
    pub fn insert(&mut self, key: OrderKey, frame: CaptureFrameDesc) -> bool {
        self.entries.insert(key, frame).is_some()
    }

    /// Moves every entry of `newer` into this batch, replacing entries with
    /// the same key.
    pub fn absorb(&mut self, newer: FrameBatch) {
        self.entries.extend(newer.entries);
    }

    pub fn keys(&self) -> impl Iterator<Item = OrderKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn into_entries(self) -> BTreeMap<OrderKey, CaptureFrameDesc> {
        self.entries
    }
}
