//! Named events with listeners and blocking waits.
//!
//! The compositor triggers [`COMPOSITE_PUBLISHED`] after every publish so a
//! rendering surface can schedule a repaint without polling.

mod hub;
mod params;

pub use hub::{EventHub, ListenerFn};
pub use params::{EventParams, EventValue};

/// Fired by the compositor after each published composite frame.
///
/// Parameters: `cycle` (Int), `layers` (Int), `frame` (Texture).
pub const COMPOSITE_PUBLISHED: &str = "composite-frame-published";
