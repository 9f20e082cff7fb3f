use hashbrown::HashMap;
use tracing::debug;

use crate::gpu::Gpu;
use crate::statistics::{ChannelMode, KernelId, OutputKind};

const REDUCE_SHADER: &str = include_str!("reduce.wgsl");
const ACCUMULATOR_SHADER: &str = include_str!("accumulator.wgsl");

pub(crate) const PARAMS_BINDING: u32 = 0;
pub(crate) const IMAGE_BINDING: u32 = 1;
pub(crate) const RESULTS_BINDING: u32 = 2;
pub(crate) const COORDS_BINDING: u32 = 3;
pub(crate) const ACCUMULATOR_BINDING: u32 = 4;

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    module: &wgpu::ShaderModule,
    entry_point: &str,
    bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Bind group layouts for the three output shapes of the reduce kernels.
#[derive(Debug)]
pub(crate) struct ReduceLayouts {
    accumulator: wgpu::BindGroupLayout,
    partial: wgpu::BindGroupLayout,
    partial_coords: wgpu::BindGroupLayout,
}

impl ReduceLayouts {
    fn new(device: &wgpu::Device) -> Self {
        let accumulator = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("reduce_accumulator_bind_group_layout"),
            entries: &[
                uniform_entry(PARAMS_BINDING),
                storage_entry(IMAGE_BINDING, true),
                storage_entry(ACCUMULATOR_BINDING, false),
            ],
        });
        let partial = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("reduce_partial_bind_group_layout"),
            entries: &[
                uniform_entry(PARAMS_BINDING),
                storage_entry(IMAGE_BINDING, true),
                storage_entry(RESULTS_BINDING, false),
            ],
        });
        let partial_coords = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("reduce_partial_coords_bind_group_layout"),
            entries: &[
                uniform_entry(PARAMS_BINDING),
                storage_entry(IMAGE_BINDING, true),
                storage_entry(RESULTS_BINDING, false),
                storage_entry(COORDS_BINDING, false),
            ],
        });

        Self {
            accumulator,
            partial,
            partial_coords,
        }
    }

    fn for_output(&self, output: OutputKind) -> &wgpu::BindGroupLayout {
        match output {
            OutputKind::Accumulator => &self.accumulator,
            OutputKind::Partial => &self.partial,
            OutputKind::PartialCoords => &self.partial_coords,
        }
    }
}

/// One compiled reduce kernel.
#[derive(Debug)]
pub(crate) struct ReducePipeline {
    pub compute_pipeline: wgpu::ComputePipeline,
    pub output: OutputKind,
}

/// Single-work-item kernels seeding and decoding the accumulator.
#[derive(Debug)]
pub(crate) struct AccumulatorPipelines {
    pub init: wgpu::ComputePipeline,
    pub finalize: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl AccumulatorPipelines {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("accumulator_shader"),
            source: wgpu::ShaderSource::Wgsl(ACCUMULATOR_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("accumulator_bind_group_layout"),
            entries: &[
                uniform_entry(PARAMS_BINDING),
                storage_entry(ACCUMULATOR_BINDING, false),
            ],
        });

        let init = create_pipeline(device, "accumulator_init", &shader, "init", &bind_group_layout);
        let finalize = create_pipeline(
            device,
            "accumulator_finalize",
            &shader,
            "finalize",
            &bind_group_layout,
        );

        Self {
            init,
            finalize,
            bind_group_layout,
        }
    }
}

/// Lazily compiled reduce kernels keyed by [`KernelId`].
#[derive(Debug)]
pub(crate) struct PipelineCache {
    group_size: u32,
    layouts: ReduceLayouts,
    accumulator: AccumulatorPipelines,
    reduce: HashMap<KernelId, ReducePipeline>,
}

impl PipelineCache {
    pub fn new(gpu: &Gpu, group_size: u32) -> Self {
        let device = gpu.device();
        Self {
            group_size,
            layouts: ReduceLayouts::new(device),
            accumulator: AccumulatorPipelines::new(device),
            reduce: HashMap::new(),
        }
    }

    pub fn accumulator(&self) -> &AccumulatorPipelines {
        &self.accumulator
    }

    pub fn layout(&self, output: OutputKind) -> &wgpu::BindGroupLayout {
        self.layouts.for_output(output)
    }

    pub fn get_or_create(&mut self, gpu: &Gpu, kernel: KernelId) -> &ReducePipeline {
        let group_size = self.group_size;
        let layouts = &self.layouts;
        self.reduce.entry(kernel).or_insert_with(|| {
            debug!(kernel = kernel.name(), group_size, "compiling reduce kernel");

            let device = gpu.device();
            let source = reduce_source(kernel, group_size);
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kernel.name()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            let output = kernel.output();
            let entry_point = match output {
                OutputKind::Accumulator => "reduce_accumulate",
                OutputKind::Partial => "reduce_partial",
                OutputKind::PartialCoords => "reduce_partial_coords",
            };
            let compute_pipeline = create_pipeline(
                device,
                kernel.name(),
                &shader,
                entry_point,
                layouts.for_output(output),
            );

            ReducePipeline {
                compute_pipeline,
                output,
            }
        })
    }
}

/// Specializes the reduce shader template for one kernel.
pub(crate) fn reduce_source(kernel: KernelId, group_size: u32) -> String {
    let multi = match kernel.channels() {
        ChannelMode::Single => "false",
        ChannelMode::Multi => "true",
    };
    let lanes = group_size * group_size;

    REDUCE_SHADER
        .replace("__REDUCTION__", &kernel.reduction().code().to_string())
        .replace("__MULTI_CHANNEL__", multi)
        .replace("__GROUP_SIZE__", &group_size.to_string())
        .replace("__LANES_POW2__", &lanes.next_power_of_two().to_string())
        .replace("__LANES__", &lanes.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::{CoordMode, Reduction};

    #[test]
    fn test_reduce_source_substitutes_every_placeholder() {
        let kernel = KernelId::new(Reduction::MeanSqr, ChannelMode::Multi, CoordMode::Without).unwrap();
        let source = reduce_source(kernel, 3);

        assert!(!source.contains("__"));
        assert!(source.contains("const REDUCTION: u32 = 7u;"));
        assert!(source.contains("const MULTI_CHANNEL: bool = true;"));
        assert!(source.contains("@workgroup_size(3, 3, 1)"));
        assert!(source.contains("const LANES: u32 = 9u;"));
        assert!(source.contains("const LANES_POW2: u32 = 16u;"));
    }
}
