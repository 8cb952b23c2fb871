use std::fmt;

use crate::pipeline::PipelineError;
use crate::resource::TextureRef;

/// Layering rank of a source. Lower keys composite first.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OrderKey(pub u32);

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key {}", self.0)
    }
}

/// Runs on the compositor thread before merge and may replace the texture
/// (crop, scale...).
pub type FrameTransform = Box<dyn FnOnce(TextureRef) -> Result<TextureRef, PipelineError> + Send>;

/// One pending contribution to a composite batch.
pub struct CaptureFrameDesc {
    pub texture: TextureRef,
    pub event_name: String,
    transform: Option<FrameTransform>,
}

impl CaptureFrameDesc {
    pub fn new(texture: TextureRef, event_name: impl Into<String>) -> Self {
        Self {
            texture,
            event_name: event_name.into(),
            transform: None,
        }
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: FnOnce(TextureRef) -> Result<TextureRef, PipelineError> + Send + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// Applies the transform, if any, and returns the texture to merge.
    pub(crate) fn resolve(self) -> (String, Result<TextureRef, PipelineError>) {
        let texture = match self.transform {
            Some(transform) => transform(self.texture),
            None => Ok(self.texture),
        };
        (self.event_name, texture)
    }
}

impl fmt::Debug for CaptureFrameDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureFrameDesc")
            .field("texture", &self.texture.label())
            .field("event_name", &self.event_name)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
