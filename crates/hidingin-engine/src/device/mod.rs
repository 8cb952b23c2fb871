//! wgpu implementation of the GPU backend.
//!
//! This module is responsible for:
//! - creating a headless wgpu Instance/Adapter/Device/Queue
//! - allocating textures as [`WgpuTexture`] resource handles
//! - encoding [`GpuOp`](crate::pipeline::GpuOp)s with copy, render and compute passes

mod backend;
mod init;
mod kernels;
mod texture;

pub use backend::WgpuBackend;
pub use init::GpuInit;
pub use texture::{WgpuTexture, texture_format};
