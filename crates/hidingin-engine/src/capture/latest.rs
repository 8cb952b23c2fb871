use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::resource::TextureRef;

use super::OrderKey;

/// The most recent composite output and what produced it.
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    pub texture: TextureRef,
    pub cycle: u64,
    /// Merged layers, in merge order.
    pub keys: Vec<OrderKey>,
    pub event_names: Vec<String>,
    /// Keys whose layer was carried over from an earlier cycle.
    pub stale_keys: Vec<OrderKey>,
    pub published_at: Instant,
}

/// Single-slot publication point, replaced wholesale on every publish.
#[derive(Debug, Default)]
pub(crate) struct LatestFrame {
    slot: Mutex<Option<PublishedFrame>>,
    published: AtomicU64,
}

impl LatestFrame {
    pub(crate) fn publish(&self, frame: PublishedFrame) {
        *self.slot.lock() = Some(frame);
        self.published.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> Option<PublishedFrame> {
        self.slot.lock().clone()
    }

    pub(crate) fn count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }
}
