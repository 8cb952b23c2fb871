//! Frame assembly and composition.
//!
//! Capture sources deliver frames asynchronously through [`FrameSink`]s. The
//! [`CompositeCapture`] collects one frame per source into a batch, and a
//! dedicated compositor thread merges each batch (full, or partial once the
//! cycle deadline passes) in ascending [`OrderKey`] order and publishes the
//! result as the latest composite frame.
//!
//! ```ignore
//! let capture = CompositeCapture::new(CompositeCaptureArgs::new(2, 16), merger);
//! let desktop = capture.add_source(desktop_source, CaptureArgs::whole_desktop("desktop"))?;
//! let app = capture.add_source(app_source, CaptureArgs::application("app", "Preview"))?;
//! capture.start_all()?;
//! // ...
//! let frame = capture.latest_composite_frame();
//! ```

mod args;
mod batch;
mod compositor;
mod error;
mod frame;
mod latest;
mod merge;
mod source;

pub use args::{CaptureArgs, CompositeCaptureArgs, SourceKind};
pub use batch::FrameBatch;
pub use compositor::{CaptureStatus, CompositeCapture, CompositorState};
pub use error::CaptureError;
pub use frame::{CaptureFrameDesc, FrameTransform, OrderKey};
pub use latest::PublishedFrame;
pub use merge::{Layer, LayerMerger, PipelineMerger};
pub use source::{CaptureSource, FrameSink};
