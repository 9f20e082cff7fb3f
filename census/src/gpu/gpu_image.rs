use tracing::warn;
use wgpu::util::DeviceExt;

use crate::prelude::*;

const LABEL: &str = "gpu_image";

/// Image pixels stored on the GPU as a read-only storage buffer.
///
/// Rows keep the host's 4-byte aligned stride, so kernels address pixels
/// with the same `y * stride + x * pixel_bytes` offsets as the host.
#[derive(Debug)]
pub struct GpuImage {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) desc: ImageDesc,
}

impl GpuImage {
    /// Uploads a host image.
    ///
    /// Images above the device buffer limits, and uploads the device rejects,
    /// are reported as [`Error::Allocation`].
    pub fn from_image(ctx: &Gpu, image: &Image) -> Result<Self> {
        let device = ctx.device();
        let bytes = image.bytes().len() as u64;
        let limits = device.limits();
        if bytes == 0
            || bytes > limits.max_buffer_size
            || bytes > limits.max_storage_buffer_binding_size as u64
        {
            return Err(Error::Allocation {
                label: LABEL,
                bytes,
            });
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gpu_image_buffer"),
            contents: image.bytes(),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(err) = validation.or(out_of_memory) {
            warn!(bytes, error = %err, "gpu image upload failed");
            return Err(Error::Allocation {
                label: LABEL,
                bytes,
            });
        }

        Ok(Self {
            buffer,
            desc: *image.desc(),
        })
    }

    /// Returns the image descriptor.
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    pub(crate) fn as_entire_binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}
