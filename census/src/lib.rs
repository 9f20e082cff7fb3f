mod accelerator;
mod common;
mod gpu;
mod image;
mod statistics;

pub mod prelude;

pub use prelude::*;

pub use crate::accelerator::{CpuBuffer, DEFAULT_GROUP_SIZE, Element, GroupGrid, Outputs};
pub use crate::gpu::{GpuBuffer, GpuImage, MAX_GROUP_SIZE};
pub use crate::statistics::{
    ACCUMULATOR_SLOTS, COORD_STRIDE, COUNT_SLOT, ChannelMode, CoordMode, Direction, KernelId,
    OutputKind, RESULT_STRIDE, Reduction, SizeCache, combine,
};
