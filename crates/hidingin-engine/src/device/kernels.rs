use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

/// Compute workgroup edge; matches `@workgroup_size(8, 8)` in the shaders.
pub(crate) const WORKGROUP: u32 = 8;

/// Largest blur radius evaluated; wider kernels are truncated.
pub(crate) const MAX_BLUR_RADIUS: u32 = 16;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct BlurParams {
    pub sigma: f32,
    pub radius: u32,
    pub _pad: [u32; 2], // 16-byte uniform size
}

impl BlurParams {
    /// Three sigmas cover >99% of the kernel weight.
    pub(crate) fn for_sigma(sigma: f32) -> Self {
        let sigma = if sigma.is_finite() { sigma.max(0.01) } else { 0.01 };
        let radius = ((sigma * 3.0).ceil() as u32).min(MAX_BLUR_RADIUS);
        Self {
            sigma,
            radius,
            _pad: [0; 2],
        }
    }
}

pub(crate) fn workgroups(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(WORKGROUP), height.div_ceil(WORKGROUP))
}

pub(crate) fn premul_alpha_blend() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

/// Render pipeline drawing one sampled texture over a whole target.
#[derive(Clone)]
pub(crate) struct LayerKernel {
    pub pipeline: Arc<wgpu::RenderPipeline>,
    pub bind_group_layout: Arc<wgpu::BindGroupLayout>,
    pub sampler: Arc<wgpu::Sampler>,
}

#[derive(Clone)]
pub(crate) struct ComputeKernel {
    pub pipeline: Arc<wgpu::ComputePipeline>,
    pub bind_group_layout: Arc<wgpu::BindGroupLayout>,
}

/// Lazily built pipelines, shared by every pass.
///
/// Render pipelines depend on the target format and on whether the draw
/// blends, so they are cached per `(format, blend)`.
#[derive(Default)]
pub(crate) struct Kernels {
    layer_bgl: Option<Arc<wgpu::BindGroupLayout>>,
    layer_module: Option<wgpu::ShaderModule>,
    sampler: Option<Arc<wgpu::Sampler>>,
    layer_pipelines: HashMap<(wgpu::TextureFormat, bool), Arc<wgpu::RenderPipeline>>,
    blur: Option<ComputeKernel>,
    subtract: Option<ComputeKernel>,
}

impl Kernels {
    pub(crate) fn layer(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat, blend: bool) -> LayerKernel {
        let bind_group_layout = self
            .layer_bgl
            .get_or_insert_with(|| Arc::new(layer_bind_group_layout(device)))
            .clone();
        let sampler = self
            .sampler
            .get_or_insert_with(|| Arc::new(linear_sampler(device)))
            .clone();

        let pipeline = match self.layer_pipelines.get(&(format, blend)) {
            Some(pipeline) => pipeline.clone(),
            None => {
                let module = self.layer_module.get_or_insert_with(|| {
                    device.create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some("hidingin layer shader"),
                        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/layer.wgsl").into()),
                    })
                });
                log::debug!("building layer pipeline for {format:?} (blend: {blend})");
                let pipeline = Arc::new(layer_pipeline(device, module, &bind_group_layout, format, blend));
                self.layer_pipelines.insert((format, blend), pipeline.clone());
                pipeline
            }
        };

        LayerKernel {
            pipeline,
            bind_group_layout,
            sampler,
        }
    }

    pub(crate) fn blur(&mut self, device: &wgpu::Device) -> ComputeKernel {
        self.blur
            .get_or_insert_with(|| {
                log::debug!("building blur kernel");
                compute_kernel(
                    device,
                    "hidingin blur",
                    include_str!("shaders/blur.wgsl"),
                    &[
                        sampled_entry(0),
                        storage_entry(1),
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<BlurParams>() as u64),
                            },
                            count: None,
                        },
                    ],
                )
            })
            .clone()
    }

    pub(crate) fn subtract(&mut self, device: &wgpu::Device) -> ComputeKernel {
        self.subtract
            .get_or_insert_with(|| {
                log::debug!("building subtract kernel");
                compute_kernel(
                    device,
                    "hidingin subtract",
                    include_str!("shaders/subtract.wgsl"),
                    &[sampled_entry(0), sampled_entry(1), storage_entry(2)],
                )
            })
            .clone()
    }
}

fn sampled_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::Rgba8Unorm,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn layer_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("hidingin layer bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn linear_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("hidingin layer sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}

fn layer_pipeline(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    bind_group_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    blend: bool,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("hidingin layer pipeline layout"),
        bind_group_layouts: &[bind_group_layout],
        immediate_size: 0,
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("hidingin layer pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            // Fullscreen triangle generated from the vertex index.
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: blend.then(premul_alpha_blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

fn compute_kernel(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> ComputeKernel {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries,
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&bind_group_layout],
        immediate_size: 0,
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });

    ComputeKernel {
        pipeline: Arc::new(pipeline),
        bind_group_layout: Arc::new(bind_group_layout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_radius_follows_sigma_and_is_capped() {
        assert_eq!(BlurParams::for_sigma(1.0).radius, 3);
        assert_eq!(BlurParams::for_sigma(2.5).radius, 8);
        assert_eq!(BlurParams::for_sigma(100.0).radius, MAX_BLUR_RADIUS);
    }

    #[test]
    fn degenerate_sigma_is_clamped() {
        let p = BlurParams::for_sigma(0.0);
        assert!(p.sigma > 0.0);
        assert_eq!(p.radius, 1);
        assert!(BlurParams::for_sigma(f32::NAN).sigma > 0.0);
    }

    #[test]
    fn blur_params_fill_one_uniform_slot() {
        assert_eq!(std::mem::size_of::<BlurParams>(), 16);
    }

    #[test]
    fn workgroups_cover_partial_tiles() {
        assert_eq!(workgroups(1920, 1080), (240, 135));
        assert_eq!(workgroups(1, 9), (1, 2));
    }
}
