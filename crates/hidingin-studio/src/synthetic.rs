use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use hidingin_engine::capture::{CaptureError, CaptureFrameDesc, CaptureSource, FrameSink};
use hidingin_engine::coords::PixelRect;
use hidingin_engine::device::WgpuBackend;
use hidingin_engine::pipeline::GpuPipeline;
use hidingin_engine::resource::{PixelFormat, TextureAllocator, TextureDesc, TextureRef};

/// Stand-in for a platform capture stream: fills its textures with a pulsing
/// solid color at a fixed rate.
pub struct SyntheticSource {
    name: String,
    backend: Arc<WgpuBackend>,
    pipeline: Arc<GpuPipeline>,
    desc: TextureDesc,
    color: [u8; 4],
    period: Duration,
    /// Application windows are cropped out of the full frame before merge.
    window: Option<PixelRect>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn desktop(backend: Arc<WgpuBackend>, pipeline: Arc<GpuPipeline>, desc: TextureDesc) -> Self {
        Self::new("desktop", backend, pipeline, desc, [40, 60, 90, 255], None)
    }

    pub fn application(
        name: &str,
        backend: Arc<WgpuBackend>,
        pipeline: Arc<GpuPipeline>,
        desc: TextureDesc,
        index: usize,
    ) -> Self {
        let shade = (index as u8).wrapping_mul(70);
        let window = PixelRect::new(desc.width / 8, desc.height / 8, desc.width / 2, desc.height / 2);
        Self::new(name, backend, pipeline, desc, [200, shade, 80, 160], Some(window))
    }

    fn new(
        name: &str,
        backend: Arc<WgpuBackend>,
        pipeline: Arc<GpuPipeline>,
        desc: TextureDesc,
        color: [u8; 4],
        window: Option<PixelRect>,
    ) -> Self {
        Self {
            name: name.to_string(),
            backend,
            pipeline,
            desc,
            color,
            period: Duration::from_millis(10),
            window,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl CaptureSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, sink: FrameSink) -> Result<()> {
        // Two frames in flight: one being filled while the compositor reads the other.
        let frames = [
            self.backend.allocate(&self.desc, &format!("{}-frame-0", self.name))?,
            self.backend.allocate(&self.desc, &format!("{}-frame-1", self.name))?,
        ];
        let cropped = match self.window {
            Some(window) => {
                let desc = TextureDesc::new(window.width, window.height, self.desc.format);
                Some((window, self.backend.allocate(&desc, &format!("{}-window", self.name))?))
            }
            None => None,
        };

        let worker = Worker {
            backend: Arc::clone(&self.backend),
            pipeline: Arc::clone(&self.pipeline),
            color: self.color,
            period: self.period,
            frames,
            cropped,
            stop: Arc::clone(&self.stop),
            sink,
        };
        let handle = thread::Builder::new()
            .name(format!("capture-{}", self.name))
            .spawn(move || worker.run())
            .context("failed to spawn capture thread")?;
        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("capture thread `{}` panicked", self.name);
            }
        }
    }
}

struct Worker {
    backend: Arc<WgpuBackend>,
    pipeline: Arc<GpuPipeline>,
    color: [u8; 4],
    period: Duration,
    frames: [TextureRef; 2],
    cropped: Option<(PixelRect, TextureRef)>,
    stop: Arc<AtomicBool>,
    sink: FrameSink,
}

impl Worker {
    fn run(self) {
        let mut produced = 0u64;
        while !self.stop.load(Ordering::Acquire) {
            let frame = &self.frames[(produced % 2) as usize];
            if let Err(err) = self.backend.fill(frame, pulse(self.color, produced)) {
                log::warn!("`{}`: fill failed: {err}", self.sink.event_name());
                break;
            }

            let mut desc = CaptureFrameDesc::new(frame.clone(), self.sink.event_name());
            if let Some((window, target)) = &self.cropped {
                let (pipeline, window, target) = (Arc::clone(&self.pipeline), *window, target.clone());
                desc = desc.with_transform(move |full| {
                    pipeline.crop(full, target.clone(), window).wait()?;
                    Ok(target)
                });
            }

            match self.sink.contribute_frame(desc) {
                Ok(()) => produced += 1,
                Err(CaptureError::Stopped) => break,
                Err(err) => {
                    log::warn!("`{}`: contribute failed: {err}", self.sink.event_name());
                    break;
                }
            }
            thread::sleep(self.period);
        }
        log::debug!("`{}` produced {produced} frame(s)", self.sink.event_name());
    }
}

/// Modulates brightness so consecutive frames differ.
fn pulse(color: [u8; 4], frame: u64) -> [u8; 4] {
    let phase = (frame % 64) as f32 / 63.0;
    let scale = 0.6 + 0.4 * phase;
    [
        (color[0] as f32 * scale) as u8,
        (color[1] as f32 * scale) as u8,
        (color[2] as f32 * scale) as u8,
        color[3],
    ]
}

/// Every synthetic frame shares the desktop's size and the capture format.
pub fn frame_desc(width: u32, height: u32) -> TextureDesc {
    TextureDesc::new(width, height, PixelFormat::Bgra8Unorm)
}
