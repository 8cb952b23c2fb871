//! GPU resource handles and the texture reuse cache.
//!
//! Engine code never names a graphics API. Textures travel as [`TextureRef`]
//! trait objects; a backend implements [`ResourceHandle`] for its own texture
//! type and [`TextureAllocator`] to create them.

mod cache;
mod error;
mod handle;

pub use cache::{MismatchPolicy, TextureCache, TextureId};
pub use error::ResourceError;
pub use handle::{PixelFormat, ResourceHandle, TextureAllocator, TextureDesc, TextureRef, same_resource};
