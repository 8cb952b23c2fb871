use std::sync::Arc;

use crate::resource::TextureRef;

use super::compositor::Shared;
use super::{CaptureError, CaptureFrameDesc, OrderKey};

/// A producer of frames, such as a desktop or per-application capture stream.
///
/// `start` receives the sink bound to the source's order key and usually
/// hands it to a capture thread or callback.
pub trait CaptureSource: Send {
    fn name(&self) -> &str;

    fn start(&mut self, sink: FrameSink) -> anyhow::Result<()>;

    /// Stops producing frames. Called once, after which the sink is dropped.
    fn stop(&mut self);
}

/// Handle through which one source contributes frames.
#[derive(Clone)]
pub struct FrameSink {
    key: OrderKey,
    event_name: String,
    shared: Arc<Shared>,
}

impl FrameSink {
    pub(crate) fn new(key: OrderKey, event_name: String, shared: Arc<Shared>) -> Self {
        Self {
            key,
            event_name,
            shared,
        }
    }

    pub fn key(&self) -> OrderKey {
        self.key
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Contributes `texture` under this source's event name.
    pub fn contribute(&self, texture: TextureRef) -> Result<(), CaptureError> {
        self.contribute_frame(CaptureFrameDesc::new(texture, self.event_name.clone()))
    }

    pub fn contribute_frame(&self, frame: CaptureFrameDesc) -> Result<(), CaptureError> {
        self.shared.contribute(self.key, frame)
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("key", &self.key)
            .field("event_name", &self.event_name)
            .finish_non_exhaustive()
    }
}
