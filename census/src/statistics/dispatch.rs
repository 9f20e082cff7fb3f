use tracing::trace;

use crate::accelerator::{Accelerator, Outputs};
use crate::prelude::*;
use crate::statistics::{ChannelMode, CoordMode, KernelId, Reduction};

/// Seeds the accumulator and launches an extremum kernel that reduces fully
/// on the device.
pub(crate) fn dispatch_accumulate<A: Accelerator>(
    accelerator: &mut A,
    reduction: Reduction,
    channels: ChannelMode,
    image: &ImageBuffer,
    accumulator: &mut A::Buffer<f32>,
) -> Result<()> {
    let kernel = KernelId::new(reduction, channels, CoordMode::Without)?;
    let format = image.desc().color_format;
    let seed = reduction.seed(format).ok_or(Error::UnsupportedKernel {
        reduction,
        channels,
        coords: CoordMode::Without,
    })?;

    trace!(kernel = kernel.name(), image = %image.desc(), seed, backend = accelerator.name(), "dispatch");

    accelerator.init_accumulator(accumulator, seed)?;
    accelerator.launch(kernel, image, Outputs::Accumulator(accumulator))
}

/// Launches a kernel writing one partial entry per work-group.
pub(crate) fn dispatch_partial<A: Accelerator>(
    accelerator: &mut A,
    reduction: Reduction,
    channels: ChannelMode,
    image: &ImageBuffer,
    results: &mut A::Buffer<f32>,
) -> Result<()> {
    let kernel = KernelId::new(reduction, channels, CoordMode::Without)?;

    trace!(kernel = kernel.name(), image = %image.desc(), backend = accelerator.name(), "dispatch");

    accelerator.launch(kernel, image, Outputs::Partial(results))
}

/// Launches a single-channel extremum kernel that also records where each
/// group's extremum sits.
pub(crate) fn dispatch_coords<A: Accelerator>(
    accelerator: &mut A,
    reduction: Reduction,
    image: &ImageBuffer,
    results: &mut A::Buffer<f32>,
    coords: &mut A::Buffer<i32>,
) -> Result<()> {
    let kernel = KernelId::new(reduction, ChannelMode::Single, CoordMode::With)?;

    trace!(kernel = kernel.name(), image = %image.desc(), backend = accelerator.name(), "dispatch");

    accelerator.launch(kernel, image, Outputs::PartialCoords { results, coords })
}
