//! HidingIn engine crate.
//!
//! Frame compositing and GPU task scheduling for the overlay: capture sources
//! feed the [`capture`] assembler, which merges ordered layers through the
//! [`pipeline`] facade on top of the [`task`] scheduler, reusing textures from
//! the [`resource`] cache. [`device`] provides the wgpu backend.

pub mod capture;
pub mod coords;
pub mod device;
pub mod events;
pub mod logging;
pub mod pipeline;
pub mod resource;
pub mod task;
pub mod time;

#[cfg(test)]
mod test_support;
