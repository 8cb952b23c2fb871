//! In-memory backend for unit tests. Records operations instead of touching a GPU.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::pipeline::{GpuBackend, GpuOp, LoadMode, PassKind, PipelineError};
use crate::resource::{ResourceError, ResourceHandle, TextureAllocator, TextureDesc, TextureRef};

#[derive(Debug)]
pub(crate) struct FakeTexture {
    label: String,
    desc: TextureDesc,
    released: AtomicBool,
}

impl FakeTexture {
    pub(crate) fn new(label: &str, desc: TextureDesc) -> TextureRef {
        Arc::new(Self {
            label: label.to_string(),
            desc,
            released: AtomicBool::new(false),
        })
    }
}

impl ResourceHandle for FakeTexture {
    fn describe(&self) -> TextureDesc {
        self.desc
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn bind(&self) -> Result<(), ResourceError> {
        if self.released.load(Ordering::Acquire) {
            return Err(ResourceError::Released(self.label.clone()));
        }
        Ok(())
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    allocations: AtomicUsize,
    fail_allocations: AtomicBool,
    failing_op: Mutex<Option<&'static str>>,
    ops: Mutex<Vec<String>>,
    threads: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_allocations(&self, fail: bool) {
        self.fail_allocations.store(fail, Ordering::SeqCst);
    }

    /// Makes every op with this [`GpuOp::name`] fail with `Unsupported`.
    pub(crate) fn fail_op(&self, name: Option<&'static str>) {
        *self.failing_op.lock() = name;
    }

    /// Encoded operations, as `"{pass:?} {op} {src}->{dst}"`.
    pub(crate) fn ops(&self) -> Vec<String> {
        self.ops.lock().clone()
    }

    /// Name of the thread each operation was encoded on.
    pub(crate) fn threads(&self) -> Vec<String> {
        self.threads.lock().clone()
    }
}

impl TextureAllocator for FakeBackend {
    fn allocate(&self, desc: &TextureDesc, label: &str) -> Result<TextureRef, ResourceError> {
        if self.fail_allocations.load(Ordering::SeqCst) {
            return Err(ResourceError::Allocation {
                label: label.to_string(),
                reason: "fake allocation failure".to_string(),
            });
        }
        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(FakeTexture::new(label, *desc))
    }
}

fn own(texture: &TextureRef) -> Result<&str, PipelineError> {
    match texture.as_any().downcast_ref::<FakeTexture>() {
        Some(fake) => Ok(fake.label()),
        None => Err(ResourceError::ForeignHandle(texture.label().to_string()).into()),
    }
}

impl GpuBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn encode(&self, pass: PassKind, op: &GpuOp) -> Result<(), PipelineError> {
        if *self.failing_op.lock() == Some(op.name()) {
            return Err(PipelineError::Unsupported {
                backend: "fake".to_string(),
                op: op.name(),
                reason: "configured to fail".to_string(),
            });
        }

        let line = match op {
            GpuOp::Blit { src, dst } | GpuOp::Scale { src, dst } | GpuOp::GaussianBlur { src, dst, .. } => {
                format!("{pass:?} {} {}->{}", op.name(), own(src)?, own(dst)?)
            }
            GpuOp::Crop { src, dst, region } => format!(
                "{pass:?} crop {}->{} {},{} {}x{}",
                own(src)?,
                own(dst)?,
                region.x,
                region.y,
                region.width,
                region.height
            ),
            GpuOp::Subtract {
                minuend,
                subtrahend,
                dst,
            } => format!(
                "{pass:?} subtract {}-{}->{}",
                own(minuend)?,
                own(subtrahend)?,
                own(dst)?
            ),
            GpuOp::DrawLayer { src, target, load } => {
                let load = match load {
                    LoadMode::Clear => "clear",
                    LoadMode::Keep => "keep",
                };
                format!("{pass:?} draw layer {}->{} {load}", own(src)?, own(target)?)
            }
        };

        let thread = std::thread::current().name().unwrap_or("unnamed").to_string();
        self.ops.lock().push(line);
        self.threads.lock().push(thread);
        Ok(())
    }
}
