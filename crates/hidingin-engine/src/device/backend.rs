use anyhow::{Context, Result};
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use crate::coords::PixelRect;
use crate::pipeline::{GpuBackend, GpuOp, LoadMode, PassKind, PipelineError};
use crate::resource::{PixelFormat, ResourceError, TextureAllocator, TextureDesc, TextureRef};

use super::kernels::{BlurParams, ComputeKernel, Kernels, workgroups};
use super::{GpuInit, WgpuTexture};

const BACKEND_NAME: &str = "wgpu";

/// Headless wgpu device implementing [`GpuBackend`].
///
/// Every operation is recorded into its own command encoder and submitted
/// immediately; ordering between operations comes from the pipeline's queues.
pub struct WgpuBackend {
    adapter_info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
    kernels: Mutex<Kernels>,
}

impl WgpuBackend {
    /// Acquires an adapter and device without a surface.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: GpuInit) -> Result<Self> {
        let GpuInit {
            backends,
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("hidingin-engine device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let adapter_info = adapter.get_info();
        log::info!(
            "wgpu adapter: {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.device_type,
            adapter_info.backend
        );

        Ok(Self {
            adapter_info,
            device,
            queue,
            kernels: Mutex::new(Kernels::default()),
        })
    }

    /// Blocking variant of [`new`](Self::new) for hosts without an executor.
    pub fn new_blocking(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::new(init))
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Writes tightly packed RGBA8 pixels into an 8-bit texture, swizzling for
    /// BGRA targets.
    pub fn upload_rgba(&self, texture: &TextureRef, rgba: &[u8]) -> Result<(), PipelineError> {
        texture.bind()?;
        let dst = self.own(texture)?;
        let desc = texture.describe();

        let expected = desc.width as usize * desc.height as usize * 4;
        if rgba.len() != expected {
            return Err(self.unsupported(
                "upload",
                format!("expected {expected} bytes for {}x{}, got {}", desc.width, desc.height, rgba.len()),
            ));
        }

        let pixels = match desc.format {
            PixelFormat::Rgba8Unorm => rgba.to_vec(),
            PixelFormat::Bgra8Unorm => rgba
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0], px[3]])
                .collect(),
            PixelFormat::Rgba16Float => {
                return Err(self.unsupported("upload", "8-bit upload into a float texture".to_string()));
            }
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: dst.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * 4),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Fills an 8-bit texture with one RGBA color.
    pub fn fill(&self, texture: &TextureRef, rgba: [u8; 4]) -> Result<(), PipelineError> {
        let desc = texture.describe();
        let pixels = rgba.repeat(desc.width as usize * desc.height as usize);
        self.upload_rgba(texture, &pixels)
    }

    fn own<'t>(&self, texture: &'t TextureRef) -> Result<&'t WgpuTexture, PipelineError> {
        texture
            .as_any()
            .downcast_ref::<WgpuTexture>()
            .ok_or_else(|| ResourceError::ForeignHandle(texture.label().to_string()).into())
    }

    fn unsupported(&self, op: &'static str, reason: String) -> PipelineError {
        PipelineError::Unsupported {
            backend: BACKEND_NAME.to_string(),
            op,
            reason,
        }
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    // ── copy ──────────────────────────────────────────────────────────────

    fn copy(&self, src: &TextureRef, dst: &TextureRef, region: PixelRect) -> Result<(), PipelineError> {
        let (src_tex, dst_tex) = (self.own(src)?, self.own(dst)?);
        let Some(region) = copy_region(region, src.describe(), dst.describe())? else {
            return Ok(());
        };

        let mut encoder = self.encoder("hidingin copy");
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: src_tex.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: dst_tex.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
        self.submit(encoder);
        Ok(())
    }

    // ── render ────────────────────────────────────────────────────────────

    fn draw(&self, src: &TextureRef, target: &TextureRef, load: LoadMode, blend: bool) -> Result<(), PipelineError> {
        let (src_tex, dst_tex) = (self.own(src)?, self.own(target)?);
        let format = super::texture_format(target.describe().format);
        let kernel = self.kernels.lock().layer(&self.device, format, blend);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("hidingin layer bind group"),
            layout: &kernel.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src_tex.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&kernel.sampler),
                },
            ],
        });

        let load = match load {
            LoadMode::Clear => wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            LoadMode::Keep => wgpu::LoadOp::Load,
        };

        let mut encoder = self.encoder("hidingin layer encoder");
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("hidingin layer pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: dst_tex.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            rpass.set_pipeline(&kernel.pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }
        self.submit(encoder);
        Ok(())
    }

    // ── compute ───────────────────────────────────────────────────────────

    fn storage_target<'t>(&self, op: &'static str, dst: &'t TextureRef) -> Result<&'t WgpuTexture, PipelineError> {
        let format = dst.describe().format;
        if format != PixelFormat::Rgba8Unorm {
            return Err(self.unsupported(op, format!("compute output must be Rgba8Unorm, `{}` is {format:?}", dst.label())));
        }
        self.own(dst)
    }

    fn dispatch(
        &self,
        label: &str,
        kernel: &ComputeKernel,
        entries: &[wgpu::BindGroupEntry<'_>],
        target: TextureDesc,
    ) {
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &kernel.bind_group_layout,
            entries,
        });

        let (x, y) = workgroups(target.width, target.height);
        let mut encoder = self.encoder(label);
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&kernel.pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(x, y, 1);
        }
        self.submit(encoder);
    }

    fn blur(&self, src: &TextureRef, dst: &TextureRef, sigma: f32) -> Result<(), PipelineError> {
        let src_tex = self.own(src)?;
        let dst_tex = self.storage_target("gaussian blur", dst)?;
        let kernel = self.kernels.lock().blur(&self.device);

        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("hidingin blur params"),
            contents: bytemuck::bytes_of(&BlurParams::for_sigma(sigma)),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        self.dispatch(
            "hidingin blur",
            &kernel,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src_tex.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(dst_tex.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
            dst.describe(),
        );
        Ok(())
    }

    fn subtract(&self, minuend: &TextureRef, subtrahend: &TextureRef, dst: &TextureRef) -> Result<(), PipelineError> {
        let (a, b) = (self.own(minuend)?, self.own(subtrahend)?);
        let dst_tex = self.storage_target("subtract", dst)?;
        let kernel = self.kernels.lock().subtract(&self.device);

        self.dispatch(
            "hidingin subtract",
            &kernel,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(a.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(b.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(dst_tex.view()),
                },
            ],
            dst.describe(),
        );
        Ok(())
    }
}

impl TextureAllocator for WgpuBackend {
    fn allocate(&self, desc: &TextureDesc, label: &str) -> Result<TextureRef, ResourceError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(ResourceError::Allocation {
                label: label.to_string(),
                reason: format!("zero-sized texture {}x{}", desc.width, desc.height),
            });
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(ResourceError::Allocation {
                label: label.to_string(),
                reason: format!("{}x{} exceeds the device limit of {max}", desc.width, desc.height),
            });
        }
        Ok(std::sync::Arc::new(WgpuTexture::new(&self.device, *desc, label)))
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn encode(&self, _pass: PassKind, op: &GpuOp) -> Result<(), PipelineError> {
        match op {
            GpuOp::Blit { src, dst } => {
                if src.describe().format == dst.describe().format {
                    self.copy(src, dst, src.describe().bounds())
                } else {
                    // Texture copies cannot convert formats; draw instead.
                    self.draw(src, dst, LoadMode::Clear, false)
                }
            }
            GpuOp::Crop { src, dst, region } => {
                if src.describe().format != dst.describe().format {
                    return Err(self.unsupported("crop", "source and destination formats differ".to_string()));
                }
                self.copy(src, dst, *region)
            }
            GpuOp::Scale { src, dst } => self.draw(src, dst, LoadMode::Clear, false),
            GpuOp::DrawLayer { src, target, load } => self.draw(src, target, *load, true),
            GpuOp::GaussianBlur { src, dst, sigma } => self.blur(src, dst, *sigma),
            GpuOp::Subtract {
                minuend,
                subtrahend,
                dst,
            } => self.subtract(minuend, subtrahend, dst),
        }
    }
}

/// Clips a copy of `region` to the source and to the destination's size.
///
/// wgpu treats an out-of-bounds copy as a device error, so every copy goes
/// through here whether or not the caller validated the region.
fn copy_region(region: PixelRect, src: TextureDesc, dst: TextureDesc) -> Result<Option<PixelRect>, PipelineError> {
    let clipped = region
        .clamp_to(src.width, src.height)
        .ok_or(PipelineError::InvalidRegion {
            region,
            width: src.width,
            height: src.height,
        })?;
    let width = clipped.width.min(dst.width);
    let height = clipped.height.min(dst.height);
    Ok((width > 0 && height > 0).then(|| PixelRect::new(clipped.x, clipped.y, width, height)))
}
