mod accelerator;
mod buffer;
mod gpu_image;
mod pipeline;


use std::sync::Arc;

use tracing::debug;

pub use self::accelerator::GpuAccelerator;
pub use self::buffer::GpuBuffer;
pub use self::gpu_image::GpuImage;

use crate::accelerator::DEFAULT_GROUP_SIZE;
use crate::common::{Error, Result};

/// Largest work-group edge: 16 × 16 work-items is the portable limit for
/// `max_compute_invocations_per_workgroup`.
pub const MAX_GROUP_SIZE: u32 = 16;

/// Adapter selection and kernel shape for a GPU context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuConfig {
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
    pub group_size: u32,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            group_size: DEFAULT_GROUP_SIZE,
        }
    }
}

impl GpuConfig {
    /// Default config adjusted by `CENSUS_GPU_LOW_POWER` and
    /// `CENSUS_GPU_FALLBACK` (`1` or `true` to enable).
    pub fn from_env() -> Self {
        let flag = |name: &str| {
            std::env::var(name)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        let mut config = Self::default();
        if flag("CENSUS_GPU_LOW_POWER") {
            config.power_preference = wgpu::PowerPreference::LowPower;
        }
        config.force_fallback_adapter = flag("CENSUS_GPU_FALLBACK");
        config
    }

    pub fn power_preference(mut self, power_preference: wgpu::PowerPreference) -> Self {
        self.power_preference = power_preference;
        self
    }

    pub fn force_fallback_adapter(mut self, force: bool) -> Self {
        self.force_fallback_adapter = force;
        self
    }

    /// Work-group edge in pixels, `1..=MAX_GROUP_SIZE`.
    pub fn group_size(mut self, group_size: u32) -> Self {
        assert!(
            (1..=MAX_GROUP_SIZE).contains(&group_size),
            "Group size must be in 1..={MAX_GROUP_SIZE}"
        );
        self.group_size = group_size;
        self
    }
}

/// GPU context holding wgpu device and queue for compute operations.
#[derive(Debug, Clone)]
pub struct Gpu {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl Gpu {
    /// Creates a new GPU context with the default config.
    pub fn new() -> Result<Self> {
        Self::with_config(&GpuConfig::default())
    }

    pub fn with_config(config: &GpuConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            compatible_surface: None,
            force_fallback_adapter: config.force_fallback_adapter,
        }))
        .map_err(|e| Error::Gpu(format!("failed to find suitable GPU adapter: {}", e)))?;

        let info = adapter.get_info();
        debug!(adapter = %info.name, backend = ?info.backend, "gpu adapter selected");

        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
                label: Some("census_device"),
                ..Default::default()
            }))
            .map_err(|e| Error::Gpu(format!("failed to create device: {}", e)))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Returns a reference to the wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a clone of the Arc to the wgpu device.
    pub fn device_arc(&self) -> Arc<wgpu::Device> {
        Arc::clone(&self.device)
    }

    /// Returns a reference to the wgpu queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Blocks until all submitted work has finished.
    pub fn wait(&self) -> Result<()> {
        wait_device(&self.device)
    }
}

pub(crate) fn wait_device(device: &wgpu::Device) -> Result<()> {
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| Error::Gpu(format!("device poll failed: {}", e)))?;
    Ok(())
}
