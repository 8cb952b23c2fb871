//! Geometry types for texture-space operations.
//!
//! Canonical space is physical texels: origin top-left, +X right, +Y down.

mod pixel_rect;

pub use pixel_rect::PixelRect;
