use std::mem;

use crate::resource::{TextureRef, TextureAllocator, TextureCache, TextureDesc, TextureId, ResourceError};
use crate::task::TaskHandle;

use super::GpuPipeline;

/// Two textures that trade roles between passes of a filter chain.
///
/// A pass reads [`first`](Self::first) and writes [`second`](Self::second);
/// [`transition`](Self::transition) then makes the output the next input.
#[derive(Debug, Clone)]
pub struct StateExchange {
    first: TextureRef,
    second: TextureRef,
}

impl StateExchange {
    pub fn new(first: TextureRef, second: TextureRef) -> Self {
        Self { first, second }
    }

    /// Requests both textures from `cache` under `{id}/a` and `{id}/b`.
    pub fn from_cache(
        cache: &TextureCache,
        id: &TextureId,
        desc: TextureDesc,
        device: &dyn TextureAllocator,
    ) -> Result<Self, ResourceError> {
        let first = cache.request(&TextureId::named(format!("{id}/a")), desc, device)?;
        let second = cache.request(&TextureId::named(format!("{id}/b")), desc, device)?;
        Ok(Self::new(first, second))
    }

    pub fn first(&self) -> &TextureRef {
        &self.first
    }

    pub fn second(&self) -> &TextureRef {
        &self.second
    }

    /// Swaps the roles of the two textures.
    pub fn transition(&mut self) {
        mem::swap(&mut self.first, &mut self.second);
    }

    /// Copies `second` into `first` on the blit queue.
    pub fn sync(&self, pipeline: &GpuPipeline) -> TaskHandle<()> {
        pipeline.blit(self.second.clone(), self.first.clone())
    }
}
