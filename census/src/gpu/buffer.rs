use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::accelerator::{DeviceBuffer, Element};
use crate::gpu::wait_device;
use crate::prelude::*;

type MapStatus = Arc<Mutex<Option<std::result::Result<(), wgpu::BufferAsyncError>>>>;

/// Storage buffer with a staging buffer and a host mirror.
///
/// A read copies the storage buffer into the staging buffer and maps it;
/// the mapped bytes land in the host mirror once the map completes.
#[derive(Debug)]
pub struct GpuBuffer<T: Element> {
    label: &'static str,
    len: usize,
    storage: wgpu::Buffer,
    staging: wgpu::Buffer,
    host: Vec<T>,
    pending: Option<MapStatus>,
    device: Arc<wgpu::Device>,
}

impl<T: Element> GpuBuffer<T> {
    /// Allocates a zero-initialized buffer of `len` elements.
    ///
    /// Sizes above the device limits and out-of-memory conditions are
    /// reported as [`Error::Allocation`] instead of a device error.
    pub fn new(gpu: &Gpu, len: usize, label: &'static str) -> Result<Self> {
        let device = gpu.device();
        let bytes = (len * size_of::<T>()) as u64;
        let limits = device.limits();
        if bytes == 0
            || bytes > limits.max_buffer_size
            || bytes > limits.max_storage_buffer_binding_size as u64
        {
            return Err(Error::Allocation { label, bytes });
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        // Fresh wgpu buffers are zero-filled.
        let storage = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gpu_buffer_staging"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            warn!(label, bytes, error = %err, "gpu buffer allocation failed");
            return Err(Error::Allocation { label, bytes });
        }

        Ok(Self {
            label,
            len,
            storage,
            staging,
            host: vec![T::default(); len],
            pending: None,
            device: gpu.device_arc(),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn storage(&self) -> &wgpu::Buffer {
        &self.storage
    }

    /// Copies the storage buffer into staging and starts mapping it.
    pub(crate) fn begin_read(&mut self, gpu: &Gpu) -> Result<()> {
        self.finish_read()?;

        let mut encoder = gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpu_buffer_read_encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.storage, 0, &self.staging, 0, self.storage.size());
        gpu.queue().submit(std::iter::once(encoder.finish()));

        let status: MapStatus = Arc::new(Mutex::new(None));
        let callback_status = Arc::clone(&status);
        self.staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                *callback_status.lock() = Some(result);
            });
        self.pending = Some(status);

        Ok(())
    }

    /// Completes an outstanding read, polling the device if the map has not
    /// finished yet.
    pub(crate) fn finish_read(&mut self) -> Result<()> {
        let Some(status) = self.pending.take() else {
            return Ok(());
        };

        if status.lock().is_none() {
            wait_device(&self.device)?;
        }

        let result = status
            .lock()
            .take()
            .ok_or_else(|| Error::Gpu(format!("map of '{}' did not complete", self.label)))?;
        if let Err(err) = result {
            warn!(label = self.label, error = %err, "gpu buffer map failed");
            return Err(err.into());
        }

        {
            let data = self.staging.slice(..).get_mapped_range();
            self.host
                .copy_from_slice(bytemuck::try_cast_slice::<u8, T>(&data)?);
        }
        self.staging.unmap();

        Ok(())
    }
}

impl<T: Element> DeviceBuffer<T> for GpuBuffer<T> {
    fn len(&self) -> usize {
        self.len
    }

    fn size(&self) -> u64 {
        self.storage.size()
    }

    fn host(&mut self) -> Result<&[T]> {
        self.finish_read()?;
        Ok(&self.host)
    }
}
