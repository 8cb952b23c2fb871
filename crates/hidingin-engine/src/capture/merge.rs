use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::pipeline::{GpuPipeline, PipelineError, StateExchange};
use crate::resource::{ResourceError, TextureCache, TextureDesc, TextureRef};

use super::OrderKey;

/// One input of a composite cycle.
#[derive(Debug, Clone)]
pub struct Layer {
    pub key: OrderKey,
    pub event_name: String,
    pub texture: TextureRef,
    /// Carried over from an earlier cycle because the source missed this one.
    pub stale: bool,
}

/// Turns an ordered layer list into one texture.
///
/// Called only from the compositor thread, with `layers` sorted by key and
/// never empty.
pub trait LayerMerger: Send + Sync {
    fn merge(&self, layers: &[Layer]) -> Result<TextureRef, PipelineError>;
}

/// Merges layers by compositing them on the GPU pipeline.
///
/// Alternates between two cached targets, so the texture published by the
/// previous cycle is never the one being drawn into.
pub struct PipelineMerger {
    pipeline: Arc<GpuPipeline>,
    targets: Mutex<StateExchange>,
    timeout: Duration,
}

impl PipelineMerger {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

    /// Allocates both targets from `cache` with `desc`.
    pub fn new(
        pipeline: Arc<GpuPipeline>,
        cache: &TextureCache,
        desc: TextureDesc,
    ) -> Result<Self, ResourceError> {
        let targets =
            StateExchange::from_cache(cache, &crate::texture_id!("composite-target"), desc, pipeline.as_ref())?;
        Ok(Self {
            pipeline,
            targets: Mutex::new(targets),
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    /// Longest a merge waits for the render queue.
    ///
    /// With an in-place render queue this bounds how long the compositor
    /// stalls when the owner stops draining.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl LayerMerger for PipelineMerger {
    fn merge(&self, layers: &[Layer]) -> Result<TextureRef, PipelineError> {
        let mut targets = self.targets.lock();
        let target = targets.second().clone();
        let textures = layers.iter().map(|layer| layer.texture.clone()).collect();

        let merged = match self.pipeline.composite(textures, target).wait_timeout(self.timeout) {
            Some(result) => result?,
            None => return Err(PipelineError::Timeout(self.timeout)),
        };
        targets.transition();
        Ok(merged)
    }
}
