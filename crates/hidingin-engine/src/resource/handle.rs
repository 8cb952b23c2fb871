use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::coords::PixelRect;

use super::ResourceError;

/// Backend-neutral texel formats used by capture and composition.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    /// Native layout of most platform capture APIs.
    Bgra8Unorm,
    Rgba16Float,
}

impl PixelFormat {
    #[inline]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8Unorm | PixelFormat::Bgra8Unorm => 4,
            PixelFormat::Rgba16Float => 8,
        }
    }
}

/// Size and format of a texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl TextureDesc {
    #[inline]
    pub const fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    #[inline]
    pub const fn bounds(&self) -> PixelRect {
        PixelRect::from_size(self.width, self.height)
    }

    #[inline]
    pub const fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// Opaque GPU resource owned by a backend.
///
/// Capability set:
/// - `describe`: size and format, without touching the GPU
/// - `bind`: validate the resource for use in an encoded operation
/// - `release`: free the backing memory early; later binds fail
///
/// Dropping the last [`TextureRef`] also frees the resource.
pub trait ResourceHandle: Send + Sync + fmt::Debug + 'static {
    fn describe(&self) -> TextureDesc;

    /// Human-readable label (cache identity or source name).
    fn label(&self) -> &str;

    fn bind(&self) -> Result<(), ResourceError>;

    fn release(&self);

    /// Lets a backend recover its concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Shared, cheaply clonable texture handle.
pub type TextureRef = Arc<dyn ResourceHandle>;

/// Identity comparison for texture handles.
#[inline]
pub fn same_resource(a: &TextureRef, b: &TextureRef) -> bool {
    Arc::ptr_eq(a, b)
}

/// Creates backend textures. Passed to the cache as the "device".
pub trait TextureAllocator: Send + Sync {
    fn allocate(&self, desc: &TextureDesc, label: &str) -> Result<TextureRef, ResourceError>;
}
