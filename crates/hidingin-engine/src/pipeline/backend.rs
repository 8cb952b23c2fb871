use crate::coords::PixelRect;
use crate::resource::{TextureAllocator, TextureRef};

use super::PipelineError;

/// Which queue (and backend encoder kind) an operation belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PassKind {
    Render,
    Compute,
    Blit,
}

/// How a render pass treats the target's existing contents.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadMode {
    /// Clear to transparent before drawing.
    Clear,
    /// Draw over what is already there.
    Keep,
}

/// One backend operation. Sources are read, `dst`/`target` is written.
#[derive(Debug, Clone)]
pub enum GpuOp {
    /// Full-texture copy; sizes are clipped to the smaller of the two.
    Blit { src: TextureRef, dst: TextureRef },
    /// Copies `region` of `src` to the origin of `dst`.
    Crop {
        src: TextureRef,
        dst: TextureRef,
        region: PixelRect,
    },
    /// Resamples `src` to cover `dst`.
    Scale { src: TextureRef, dst: TextureRef },
    GaussianBlur {
        src: TextureRef,
        dst: TextureRef,
        sigma: f32,
    },
    /// `dst = minuend - subtrahend`, clamped at zero.
    Subtract {
        minuend: TextureRef,
        subtrahend: TextureRef,
        dst: TextureRef,
    },
    /// Draws `src` over the whole of `target`.
    DrawLayer {
        src: TextureRef,
        target: TextureRef,
        load: LoadMode,
    },
}

impl GpuOp {
    pub fn name(&self) -> &'static str {
        match self {
            GpuOp::Blit { .. } => "blit",
            GpuOp::Crop { .. } => "crop",
            GpuOp::Scale { .. } => "scale",
            GpuOp::GaussianBlur { .. } => "gaussian blur",
            GpuOp::Subtract { .. } => "subtract",
            GpuOp::DrawLayer { .. } => "draw layer",
        }
    }

    /// The queue this operation is routed to.
    pub fn pass(&self) -> PassKind {
        match self {
            GpuOp::Blit { .. } | GpuOp::Crop { .. } => PassKind::Blit,
            GpuOp::GaussianBlur { .. } | GpuOp::Subtract { .. } => PassKind::Compute,
            GpuOp::Scale { .. } | GpuOp::DrawLayer { .. } => PassKind::Render,
        }
    }
}

/// A graphics API binding.
///
/// `encode` records and submits one operation. It is called from the queue
/// worker owning `pass` (or from the in-place drain thread for render work),
/// so implementations must be `Send + Sync` and may be entered concurrently
/// for different passes.
pub trait GpuBackend: TextureAllocator {
    fn name(&self) -> &str;

    fn encode(&self, pass: PassKind, op: &GpuOp) -> Result<(), PipelineError>;
}
