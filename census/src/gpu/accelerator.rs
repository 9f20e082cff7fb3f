use tracing::debug;
use wgpu::util::DeviceExt;

use crate::accelerator::{Accelerator, Element, GroupGrid, Outputs};
use crate::gpu::pipeline::{
    ACCUMULATOR_BINDING, COORDS_BINDING, IMAGE_BINDING, PARAMS_BINDING, PipelineCache,
    RESULTS_BINDING,
};
use crate::gpu::{GpuBuffer, GpuConfig, MAX_GROUP_SIZE};
use crate::prelude::*;
use crate::statistics::{KernelId, OutputKind};

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ReduceParams {
    width: u32,
    height: u32,
    stride: u32,
    channel_count: u32,
    channel_size: u32,
    groups_x: u32,
    _padding: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct InitParams {
    seed: f32,
    _padding: [u32; 3],
}

/// Reduction kernels running on a `wgpu` device.
///
/// Kernels are compiled on first use and cached for the lifetime of the
/// accelerator. Launches only submit work; [`Accelerator::read`] with
/// `blocking = true` is the synchronization point.
#[derive(Debug)]
pub struct GpuAccelerator {
    gpu: Gpu,
    group_size: u32,
    pipelines: PipelineCache,
}

impl GpuAccelerator {
    pub fn new(gpu: Gpu) -> Self {
        Self::with_group_size(gpu, GpuConfig::default().group_size)
    }

    pub fn with_group_size(gpu: Gpu, group_size: u32) -> Self {
        assert!(
            (1..=MAX_GROUP_SIZE).contains(&group_size),
            "Group size must be in 1..={MAX_GROUP_SIZE}"
        );
        let pipelines = PipelineCache::new(&gpu, group_size);
        Self {
            gpu,
            group_size,
            pipelines,
        }
    }

    /// Creates a GPU context from `config` and an accelerator on it.
    pub fn from_config(config: &GpuConfig) -> Result<Self> {
        let gpu = Gpu::with_config(config)?;
        Ok(Self::with_group_size(gpu, config.group_size))
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    pub fn group_size(&self) -> u32 {
        self.group_size
    }

    fn check_dispatch(&self, kernel: KernelId, grid: &GroupGrid) -> Result<()> {
        let max = self.gpu.device().limits().max_compute_workgroups_per_dimension;
        if grid.groups_x > max || grid.groups_y > max {
            return Err(Error::Launch {
                kernel: kernel.name(),
                reason: format!(
                    "{}x{} work-groups exceed the device limit of {} per dimension",
                    grid.groups_x, grid.groups_y, max
                ),
            });
        }
        Ok(())
    }
}

impl Accelerator for GpuAccelerator {
    type Buffer<T: Element> = GpuBuffer<T>;

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn group_count(&self, desc: &ImageDesc) -> usize {
        GroupGrid::new(desc, self.group_size).group_count()
    }

    fn send_if_needed(&mut self, image: &ImageBuffer) -> Result<()> {
        image.desc().color_format.validate()?;
        image.send_if_needed(&self.gpu)
    }

    fn create_buffer<T: Element>(
        &mut self,
        len: usize,
        label: &'static str,
    ) -> Result<GpuBuffer<T>> {
        let buffer = GpuBuffer::new(&self.gpu, len, label)?;
        debug!(label, len, "gpu buffer allocated");
        Ok(buffer)
    }

    fn init_accumulator(&mut self, accumulator: &mut GpuBuffer<f32>, seed: f32) -> Result<()> {
        let device = self.gpu.device();
        let pipelines = self.pipelines.accumulator();

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("accumulator_init_params_buffer"),
            contents: bytemuck::cast_slice(&[InitParams {
                seed,
                _padding: [0; 3],
            }]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("accumulator_init_bind_group"),
            layout: &pipelines.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: PARAMS_BINDING,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: ACCUMULATOR_BINDING,
                    resource: accumulator.storage().as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("accumulator_init_encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("accumulator_init_pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&pipelines.init);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(1, 1, 1);
        }
        self.gpu.queue().submit(std::iter::once(encoder.finish()));

        Ok(())
    }

    fn launch(
        &mut self,
        kernel: KernelId,
        image: &ImageBuffer,
        outputs: Outputs<'_, Self>,
    ) -> Result<()> {
        let output = kernel.output();
        if outputs.kind() != output {
            return Err(Error::Launch {
                kernel: kernel.name(),
                reason: format!("expected {:?} outputs, got {:?}", output, outputs.kind()),
            });
        }

        let desc = *image.desc();
        desc.color_format.validate()?;
        let grid = GroupGrid::new(&desc, self.group_size);
        self.check_dispatch(kernel, &grid)?;

        let gpu_image = image.make_gpu(&self.gpu)?;
        let device = self.gpu.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let params = ReduceParams {
            width: desc.width,
            height: desc.height,
            stride: desc.stride as u32,
            channel_count: desc.channel_count() as u32,
            channel_size: desc.color_format.channel_size.byte_count() as u32,
            groups_x: grid.groups_x,
            _padding: [0; 2],
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("reduce_params_buffer"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: PARAMS_BINDING,
                resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: IMAGE_BINDING,
                resource: gpu_image.as_entire_binding(),
            },
        ];
        let accumulator = match &outputs {
            Outputs::Accumulator(accumulator) => {
                entries.push(wgpu::BindGroupEntry {
                    binding: ACCUMULATOR_BINDING,
                    resource: accumulator.storage().as_entire_binding(),
                });
                Some(accumulator.storage())
            }
            Outputs::Partial(results) => {
                entries.push(wgpu::BindGroupEntry {
                    binding: RESULTS_BINDING,
                    resource: results.storage().as_entire_binding(),
                });
                None
            }
            Outputs::PartialCoords { results, coords } => {
                entries.push(wgpu::BindGroupEntry {
                    binding: RESULTS_BINDING,
                    resource: results.storage().as_entire_binding(),
                });
                entries.push(wgpu::BindGroupEntry {
                    binding: COORDS_BINDING,
                    resource: coords.storage().as_entire_binding(),
                });
                None
            }
        };

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name()),
            layout: self.pipelines.layout(output),
            entries: &entries,
        });

        // Finalize decodes the accumulator keys in place after the reduce pass.
        let finalize_bind_group = accumulator.map(|storage| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("accumulator_finalize_bind_group"),
                layout: &self.pipelines.accumulator().bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: PARAMS_BINDING,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: ACCUMULATOR_BINDING,
                        resource: storage.as_entire_binding(),
                    },
                ],
            })
        });

        let gpu = &self.gpu;
        let pipelines = &mut self.pipelines;
        let reduce = pipelines.get_or_create(gpu, kernel);
        debug_assert_eq!(reduce.output, output);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("reduce_encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name()),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&reduce.compute_pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(grid.groups_x, grid.groups_y, 1);
        }
        if let Some(finalize_bind_group) = &finalize_bind_group {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("accumulator_finalize_pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipelines.accumulator().finalize);
            compute_pass.set_bind_group(0, finalize_bind_group, &[]);
            compute_pass.dispatch_workgroups(1, 1, 1);
        }
        gpu.queue().submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::Launch {
                kernel: kernel.name(),
                reason: err.to_string(),
            });
        }

        Ok(())
    }

    fn read<T: Element>(&mut self, buffer: &mut GpuBuffer<T>, blocking: bool) -> Result<()> {
        buffer.begin_read(&self.gpu)?;
        if blocking {
            self.gpu.wait()?;
            buffer.finish_read()?;
        }
        Ok(())
    }
}
