//! Narrow interface between the statistics core and the device that runs
//! the per-work-group partial reductions.
//!
//! The statistics facade only ever talks to an [`Accelerator`]: it asks how
//! many work-groups an image splits into, allocates buffers, launches one of
//! the closed set of reduction kernels and reads results back. Two
//! implementations ship with the crate:
//!
//! * [`CpuAccelerator`] walks the work-group grid sequentially on the host.
//!   It is deterministic, needs no device and counts allocations.
//! * [`crate::GpuAccelerator`] runs WGSL compute kernels through `wgpu`.
//!
//! ## Work-group grid
//!
//! Both accelerators tile the image with square groups of
//! `group_size × group_size` pixels. Groups are numbered row-major over the
//! group grid, so group `g` covers column block `g % groups_x` and row block
//! `g / groups_x`. Edge groups cover fewer pixels when the image size is not
//! a multiple of the group size.

mod cpu;

use std::ops::Range;

pub use cpu::{CpuAccelerator, CpuBuffer};

use crate::prelude::*;
use crate::statistics::{KernelId, OutputKind};

/// Default work-group edge in pixels (16 × 16 = 256 work-items).
pub const DEFAULT_GROUP_SIZE: u32 = 16;

/// Element types that can live in a device buffer.
pub trait Element: bytemuck::Pod + Default + std::fmt::Debug + Send + Sync + 'static {}

impl Element for f32 {}
impl Element for i32 {}

/// Device buffer mirrored by host storage of identical element count.
pub trait DeviceBuffer<T: Element> {
    /// Number of elements.
    fn len(&self) -> usize;

    /// Size of the device allocation in bytes.
    fn size(&self) -> u64;

    /// Host copy as of the last completed read.
    ///
    /// Completes an outstanding non-blocking read first, waiting for the
    /// device if it has not finished yet.
    fn host(&mut self) -> Result<&[T]>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output buffers bound to a reduction kernel launch.
pub enum Outputs<'a, A: Accelerator + ?Sized> {
    /// 4-slot accumulator, reduced fully on the device.
    Accumulator(&'a mut A::Buffer<f32>),
    /// One `RESULT_STRIDE` entry per work-group.
    Partial(&'a mut A::Buffer<f32>),
    /// Per-group entries plus one (x, y) pair per work-group.
    PartialCoords {
        results: &'a mut A::Buffer<f32>,
        coords: &'a mut A::Buffer<i32>,
    },
}

impl<A: Accelerator + ?Sized> Outputs<'_, A> {
    pub fn kind(&self) -> OutputKind {
        match self {
            Outputs::Accumulator(_) => OutputKind::Accumulator,
            Outputs::Partial(_) => OutputKind::Partial,
            Outputs::PartialCoords { .. } => OutputKind::PartialCoords,
        }
    }
}

/// A device able to run the reduction kernels.
///
/// Launches are ordered: every operation observes the effects of the ones
/// issued before it. Launches return once the work is enqueued; completion
/// is only guaranteed after a blocking [`Accelerator::read`].
pub trait Accelerator {
    type Buffer<T: Element>: DeviceBuffer<T>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Number of work-groups the kernels split `desc` into.
    fn group_count(&self, desc: &ImageDesc) -> usize;

    /// Makes sure the image pixels are resident on the device.
    fn send_if_needed(&mut self, image: &ImageBuffer) -> Result<()>;

    /// Allocates a zero-initialized buffer of `len` elements.
    fn create_buffer<T: Element>(&mut self, len: usize, label: &'static str)
    -> Result<Self::Buffer<T>>;

    /// Seeds every accumulator slot with `seed` using a single work-item.
    fn init_accumulator(&mut self, accumulator: &mut Self::Buffer<f32>, seed: f32) -> Result<()>;

    /// Enqueues `kernel` over `image`, writing into `outputs`.
    fn launch(
        &mut self,
        kernel: KernelId,
        image: &ImageBuffer,
        outputs: Outputs<'_, Self>,
    ) -> Result<()>;

    /// Transfers a buffer from the device to its host copy.
    ///
    /// A non-blocking read may complete later; it is finished at the latest
    /// by the next [`DeviceBuffer::host`] call on the same buffer.
    fn read<T: Element>(&mut self, buffer: &mut Self::Buffer<T>, blocking: bool) -> Result<()>;
}

/// Square work-group tiling of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupGrid {
    pub group_size: u32,
    pub groups_x: u32,
    pub groups_y: u32,
}

impl GroupGrid {
    pub fn new(desc: &ImageDesc, group_size: u32) -> Self {
        assert!(group_size > 0, "Group size must be positive");
        Self {
            group_size,
            groups_x: desc.width.div_ceil(group_size),
            groups_y: desc.height.div_ceil(group_size),
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups_x as usize * self.groups_y as usize
    }

    /// Pixel columns and rows covered by group `index`, clipped to the image.
    pub fn group_bounds(&self, index: usize, desc: &ImageDesc) -> (Range<u32>, Range<u32>) {
        let gx = (index % self.groups_x as usize) as u32;
        let gy = (index / self.groups_x as usize) as u32;
        let x0 = gx * self.group_size;
        let y0 = gy * self.group_size;
        (
            x0..(x0 + self.group_size).min(desc.width),
            y0..(y0 + self.group_size).min(desc.height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_grid_exact_multiple() {
        let desc = ImageDesc::new(64, 32, ColorFormat::L_U8);
        let grid = GroupGrid::new(&desc, 16);
        assert_eq!((grid.groups_x, grid.groups_y), (4, 2));
        assert_eq!(grid.group_count(), 8);
    }

    #[test]
    fn test_group_grid_partial_edge_groups() {
        let desc = ImageDesc::new(33, 17, ColorFormat::L_U8);
        let grid = GroupGrid::new(&desc, 16);
        assert_eq!((grid.groups_x, grid.groups_y), (3, 2));

        // Last group of the first row: one column wide.
        assert_eq!(grid.group_bounds(2, &desc), (32..33, 0..16));
        // Bottom-right corner: one pixel.
        assert_eq!(grid.group_bounds(5, &desc), (32..33, 16..17));
        // Row-major numbering.
        assert_eq!(grid.group_bounds(3, &desc), (0..16, 16..17));
    }

    #[test]
    fn test_group_grid_depends_only_on_shape() {
        let a = ImageDesc::new(100, 50, ColorFormat::L_U8);
        let b = ImageDesc::new(100, 50, ColorFormat::RGBA_F32);
        assert_eq!(GroupGrid::new(&a, 16), GroupGrid::new(&b, 16));
    }

    #[test]
    #[should_panic(expected = "Group size must be positive")]
    fn test_group_grid_zero_size_panics() {
        GroupGrid::new(&ImageDesc::new(4, 4, ColorFormat::L_U8), 0);
    }
}
