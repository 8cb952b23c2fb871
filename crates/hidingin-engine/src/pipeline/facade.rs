use std::sync::Arc;

use parking_lot::Mutex;

use crate::coords::PixelRect;
use crate::resource::{ResourceError, TextureAllocator, TextureDesc, TextureRef};
use crate::task::{ExecMode, TaskHandle, TaskQueue};

use super::{GpuBackend, GpuOp, LoadMode, PassKind, PipelineConfig, PipelineError};

type RenderTrigger = Arc<dyn Fn() + Send + Sync>;

/// What a pipeline job sees while it runs.
pub struct PassContext<'a> {
    pub thread_name: &'a str,
    pub pass: PassKind,
    pub backend: &'a dyn GpuBackend,
}

impl PassContext<'_> {
    /// Encodes `op` on this job's pass.
    ///
    /// Every source and destination is bound first, so released textures fail
    /// here instead of inside the backend.
    pub fn encode(&self, op: GpuOp) -> Result<(), PipelineError> {
        for texture in op_textures(&op) {
            texture.bind()?;
        }
        log::trace!("[{}] {:?} {}", self.thread_name, self.pass, op.name());
        self.backend.encode(self.pass, &op)
    }
}

/// Render/compute/blit facade over a [`GpuBackend`].
///
/// Constructed once by the host and shared by `Arc`; there is no global
/// instance.
pub struct GpuPipeline {
    backend: Arc<dyn GpuBackend>,
    render: TaskQueue,
    compute: TaskQueue,
    blit: TaskQueue,
    render_trigger: Mutex<Option<RenderTrigger>>,
}

impl GpuPipeline {
    pub fn new(backend: Arc<dyn GpuBackend>, config: PipelineConfig) -> Result<Self, PipelineError> {
        let render = if config.render_in_place {
            TaskQueue::in_place(config.thread_name("render"), config.max_pending)
        } else {
            TaskQueue::threaded([config.thread_name("render")], config.max_pending)
                .map_err(PipelineError::Task)?
        };
        let compute = TaskQueue::threaded([config.thread_name("compute")], config.max_pending)
            .map_err(PipelineError::Task)?;
        let blit = TaskQueue::threaded([config.thread_name("blit")], config.max_pending)
            .map_err(PipelineError::Task)?;

        log::info!(
            "gpu pipeline ready on {} backend (render {})",
            backend.name(),
            if config.render_in_place { "in place" } else { "threaded" }
        );

        Ok(Self {
            backend,
            render,
            compute,
            blit,
            render_trigger: Mutex::new(None),
        })
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    pub fn render_mode(&self) -> ExecMode {
        self.render.mode()
    }

    // ── raw job submission ────────────────────────────────────────────────

    pub fn send_job_to_render_queue<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&PassContext<'_>) -> Result<T, PipelineError> + Send + 'static,
    {
        let handle = self.submit(&self.render, PassKind::Render, job);
        self.fire_render_trigger();
        handle
    }

    pub fn send_job_to_compute_queue<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&PassContext<'_>) -> Result<T, PipelineError> + Send + 'static,
    {
        self.submit(&self.compute, PassKind::Compute, job)
    }

    pub fn send_job_to_blit_queue<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&PassContext<'_>) -> Result<T, PipelineError> + Send + 'static,
    {
        self.submit(&self.blit, PassKind::Blit, job)
    }

    fn submit<T, F>(&self, queue: &TaskQueue, pass: PassKind, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&PassContext<'_>) -> Result<T, PipelineError> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        queue.submit(move |thread_name| {
            let ctx = PassContext {
                thread_name,
                pass,
                backend: backend.as_ref(),
            };
            job(&ctx).map_err(anyhow::Error::from)
        })
    }

    // ── typed operations ──────────────────────────────────────────────────

    /// Copies `src` into `dst` on the blit queue.
    pub fn blit(&self, src: TextureRef, dst: TextureRef) -> TaskHandle<()> {
        self.send_job_to_blit_queue(move |ctx| ctx.encode(GpuOp::Blit { src, dst }))
    }

    /// Copies `region` of `src` into `dst`. The region is clipped to `src`;
    /// a region entirely outside it fails with [`PipelineError::InvalidRegion`].
    pub fn crop(&self, src: TextureRef, dst: TextureRef, region: PixelRect) -> TaskHandle<()> {
        self.send_job_to_blit_queue(move |ctx| {
            let desc = src.describe();
            let region = region
                .clamp_to(desc.width, desc.height)
                .ok_or(PipelineError::InvalidRegion {
                    region,
                    width: desc.width,
                    height: desc.height,
                })?;
            ctx.encode(GpuOp::Crop { src, dst, region })
        })
    }

    pub fn scale(&self, src: TextureRef, dst: TextureRef) -> TaskHandle<()> {
        self.send_job_to_render_queue(move |ctx| ctx.encode(GpuOp::Scale { src, dst }))
    }

    pub fn gaussian_blur(&self, src: TextureRef, dst: TextureRef, sigma: f32) -> TaskHandle<()> {
        self.send_job_to_compute_queue(move |ctx| ctx.encode(GpuOp::GaussianBlur { src, dst, sigma }))
    }

    pub fn subtract(
        &self,
        minuend: TextureRef,
        subtrahend: TextureRef,
        dst: TextureRef,
    ) -> TaskHandle<()> {
        self.send_job_to_compute_queue(move |ctx| {
            ctx.encode(GpuOp::Subtract {
                minuend,
                subtrahend,
                dst,
            })
        })
    }

    /// High-pass filter: blurs `src` into `scratch`, then writes
    /// `src - scratch` to `dst`. Both steps run in one compute job, in order.
    pub fn high_pass(
        &self,
        src: TextureRef,
        scratch: TextureRef,
        dst: TextureRef,
        sigma: f32,
    ) -> TaskHandle<()> {
        self.send_job_to_compute_queue(move |ctx| {
            ctx.encode(GpuOp::GaussianBlur {
                src: src.clone(),
                dst: scratch.clone(),
                sigma,
            })?;
            ctx.encode(GpuOp::Subtract {
                minuend: src,
                subtrahend: scratch,
                dst,
            })
        })
    }

    /// Draws `layers` into `target` back to front and returns `target`.
    ///
    /// The first layer clears the target; each later one is drawn over the
    /// result so far. All draws happen in one render job, so no other render
    /// work can interleave between layers.
    pub fn composite(&self, layers: Vec<TextureRef>, target: TextureRef) -> TaskHandle<TextureRef> {
        self.send_job_to_render_queue(move |ctx| {
            if layers.is_empty() {
                return Err(PipelineError::NoLayers);
            }
            for (i, src) in layers.into_iter().enumerate() {
                let load = if i == 0 { LoadMode::Clear } else { LoadMode::Keep };
                ctx.encode(GpuOp::DrawLayer {
                    src,
                    target: target.clone(),
                    load,
                })?;
            }
            Ok(target)
        })
    }

    // ── in-place rendering ────────────────────────────────────────────────

    /// Registers a callback fired after every render submission.
    ///
    /// With an in-place render queue this is how the owner learns that work
    /// is waiting for [`execute_render_tasks_in_place`](Self::execute_render_tasks_in_place).
    pub fn set_render_trigger<F>(&self, trigger: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.render_trigger.lock() = Some(Arc::new(trigger));
    }

    /// Drains the in-place render queue on the calling thread.
    pub fn execute_render_tasks_in_place(&self) -> Result<usize, PipelineError> {
        self.render.drain_in_place().map_err(PipelineError::Task)
    }

    fn fire_render_trigger(&self) {
        let trigger = self.render_trigger.lock().clone();
        if let Some(trigger) = trigger {
            trigger();
        }
    }

    /// Number of render jobs waiting to start.
    pub fn pending_render_jobs(&self) -> usize {
        self.render.len()
    }

    /// Stops every queue. Jobs that have not started are abandoned.
    pub fn stop(&self) {
        self.render.stop();
        self.compute.stop();
        self.blit.stop();
    }
}

impl TextureAllocator for GpuPipeline {
    fn allocate(&self, desc: &TextureDesc, label: &str) -> Result<TextureRef, ResourceError> {
        self.backend.allocate(desc, label)
    }
}

fn op_textures(op: &GpuOp) -> Vec<&TextureRef> {
    match op {
        GpuOp::Blit { src, dst } | GpuOp::Scale { src, dst } => vec![src, dst],
        GpuOp::Crop { src, dst, .. } | GpuOp::GaussianBlur { src, dst, .. } => vec![src, dst],
        GpuOp::Subtract {
            minuend,
            subtrahend,
            dst,
        } => vec![minuend, subtrahend, dst],
        GpuOp::DrawLayer { src, target, .. } => vec![src, target],
    }
}
