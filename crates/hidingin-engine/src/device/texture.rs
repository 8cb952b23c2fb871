use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::resource::{PixelFormat, ResourceError, ResourceHandle, TextureDesc};

/// Maps an engine pixel format to its wgpu texture format.
pub fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

/// Usage flags for a texture of `format`.
///
/// Only `Rgba8Unorm` is a storage format without optional features, so only
/// it can be written by compute kernels.
pub(crate) fn texture_usages(format: PixelFormat) -> wgpu::TextureUsages {
    let usages = wgpu::TextureUsages::TEXTURE_BINDING
        | wgpu::TextureUsages::RENDER_ATTACHMENT
        | wgpu::TextureUsages::COPY_SRC
        | wgpu::TextureUsages::COPY_DST;
    match format {
        PixelFormat::Rgba8Unorm => usages | wgpu::TextureUsages::STORAGE_BINDING,
        _ => usages,
    }
}

/// A texture allocated by [`WgpuBackend`](super::WgpuBackend).
#[derive(Debug)]
pub struct WgpuTexture {
    label: String,
    desc: TextureDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    released: AtomicBool,
}

impl WgpuTexture {
    pub(crate) fn new(device: &wgpu::Device, desc: TextureDesc, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage: texture_usages(desc.format),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            label: label.to_string(),
            desc,
            texture,
            view,
            released: AtomicBool::new(false),
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl ResourceHandle for WgpuTexture {
    fn describe(&self) -> TextureDesc {
        self.desc
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn bind(&self) -> Result<(), ResourceError> {
        if self.is_released() {
            return Err(ResourceError::Released(self.label.clone()));
        }
        Ok(())
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            log::debug!("destroying texture `{}`", self.label);
            self.texture.destroy();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
