//! Cycle pacing.
//!
//! The compositor owns one [`CyclePacer`] and calls `tick()` once per composite
//! cycle; `deadline()` bounds how long it waits for a full batch.

mod pacer;

pub use pacer::{CycleTime, CyclePacer};
