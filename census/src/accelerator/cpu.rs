use tracing::debug;

use crate::accelerator::{
    Accelerator, DEFAULT_GROUP_SIZE, DeviceBuffer, Element, GroupGrid, Outputs,
};
use crate::prelude::*;
use crate::statistics::{
    COORD_STRIDE, COUNT_SLOT, ChannelMode, Direction, KernelId, RESULT_STRIDE,
};

/// Host buffer standing in for device memory.
///
/// Kernels write `device`; only [`Accelerator::read`] copies it to `host`, so
/// a missing read shows up as stale host data exactly like on a GPU.
#[derive(Debug)]
pub struct CpuBuffer<T: Element> {
    device: Vec<T>,
    host: Vec<T>,
}

impl<T: Element> DeviceBuffer<T> for CpuBuffer<T> {
    fn len(&self) -> usize {
        self.host.len()
    }

    fn size(&self) -> u64 {
        (self.device.len() * size_of::<T>()) as u64
    }

    fn host(&mut self) -> Result<&[T]> {
        Ok(&self.host)
    }
}

/// Sequential host implementation of the reduction kernels.
///
/// Groups are processed in ascending index and pixels inside a group in
/// row-major order, so results are deterministic. Per-group sums accumulate
/// in f32 like the device kernels do.
#[derive(Debug)]
pub struct CpuAccelerator {
    group_size: u32,
    allocation_count: usize,
    launch_count: usize,
    fail_allocations: bool,
}

impl Default for CpuAccelerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuAccelerator {
    pub fn new() -> Self {
        Self::with_group_size(DEFAULT_GROUP_SIZE)
    }

    pub fn with_group_size(group_size: u32) -> Self {
        assert!(group_size > 0, "Group size must be positive");
        Self {
            group_size,
            allocation_count: 0,
            launch_count: 0,
            fail_allocations: false,
        }
    }

    pub fn group_size(&self) -> u32 {
        self.group_size
    }

    /// Number of buffers created so far.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Number of kernel launches so far, accumulator seeding excluded.
    pub fn launch_count(&self) -> usize {
        self.launch_count
    }

    /// Makes every following allocation fail until switched off again.
    #[cfg(test)]
    pub(crate) fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }
}

impl Accelerator for CpuAccelerator {
    type Buffer<T: Element> = CpuBuffer<T>;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn group_count(&self, desc: &ImageDesc) -> usize {
        GroupGrid::new(desc, self.group_size).group_count()
    }

    fn send_if_needed(&mut self, _image: &ImageBuffer) -> Result<()> {
        Ok(())
    }

    fn create_buffer<T: Element>(
        &mut self,
        len: usize,
        label: &'static str,
    ) -> Result<CpuBuffer<T>> {
        let bytes = (len * size_of::<T>()) as u64;
        if self.fail_allocations {
            return Err(Error::Allocation { label, bytes });
        }

        self.allocation_count += 1;
        debug!(label, len, bytes, "cpu buffer allocated");

        Ok(CpuBuffer {
            device: vec![T::default(); len],
            host: vec![T::default(); len],
        })
    }

    fn init_accumulator(&mut self, accumulator: &mut CpuBuffer<f32>, seed: f32) -> Result<()> {
        accumulator.device.fill(seed);
        Ok(())
    }

    fn launch(
        &mut self,
        kernel: KernelId,
        image: &ImageBuffer,
        outputs: Outputs<'_, Self>,
    ) -> Result<()> {
        if outputs.kind() != kernel.output() {
            return Err(Error::Launch {
                kernel: kernel.name(),
                reason: format!(
                    "expected {:?} outputs, got {:?}",
                    kernel.output(),
                    outputs.kind()
                ),
            });
        }

        let image = image.image();
        let grid = GroupGrid::new(image.desc(), self.group_size);
        self.launch_count += 1;

        match outputs {
            Outputs::Accumulator(accumulator) => {
                accumulate(kernel, image, &mut accumulator.device)
            }
            Outputs::Partial(results) => {
                check_len(kernel, &results.device, grid.group_count() * RESULT_STRIDE)?;
                reduce_groups(kernel, image, &grid, &mut results.device);
                Ok(())
            }
            Outputs::PartialCoords { results, coords } => {
                check_len(kernel, &results.device, grid.group_count() * RESULT_STRIDE)?;
                check_len(kernel, &coords.device, grid.group_count() * COORD_STRIDE)?;
                locate_groups(kernel, image, &grid, &mut results.device, &mut coords.device)
            }
        }
    }

    fn read<T: Element>(&mut self, buffer: &mut CpuBuffer<T>, _blocking: bool) -> Result<()> {
        buffer.host.copy_from_slice(&buffer.device);
        Ok(())
    }
}

fn check_len<T>(kernel: KernelId, buffer: &[T], required: usize) -> Result<()> {
    if buffer.len() < required {
        return Err(Error::Launch {
            kernel: kernel.name(),
            reason: format!("output holds {} elements, {} required", buffer.len(), required),
        });
    }
    Ok(())
}

fn active_channels(kernel: KernelId, desc: &ImageDesc) -> usize {
    match kernel.channels() {
        ChannelMode::Single => 1,
        ChannelMode::Multi => desc.channel_count(),
    }
}

fn direction(kernel: KernelId) -> Result<Direction> {
    kernel.reduction().direction().ok_or_else(|| Error::Launch {
        kernel: kernel.name(),
        reason: "reduction has no extremum direction".to_string(),
    })
}

fn accumulate(kernel: KernelId, image: &Image, slots: &mut [f32]) -> Result<()> {
    let direction = direction(kernel)?;
    let reduction = kernel.reduction();
    let desc = image.desc();
    let channels = active_channels(kernel, desc);
    check_len(kernel, slots, channels)?;

    for y in 0..desc.height {
        for x in 0..desc.width {
            for (c, slot) in slots.iter_mut().enumerate().take(channels) {
                let value = reduction.transform(image.channel(x, y, c));
                if direction.prefers(value, *slot) {
                    *slot = value;
                }
            }
        }
    }
    Ok(())
}

fn reduce_groups(kernel: KernelId, image: &Image, grid: &GroupGrid, results: &mut [f32]) {
    let reduction = kernel.reduction();
    let desc = image.desc();
    let channels = active_channels(kernel, desc);

    for group in 0..grid.group_count() {
        let (xs, ys) = grid.group_bounds(group, desc);
        let mut sums = [0.0f32; 4];
        let mut count = 0u32;

        for y in ys {
            for x in xs.clone() {
                for (c, sum) in sums.iter_mut().enumerate().take(channels) {
                    *sum += reduction.transform(image.channel(x, y, c));
                }
                count += 1;
            }
        }

        let entry = &mut results[group * RESULT_STRIDE..(group + 1) * RESULT_STRIDE];
        entry[..4].copy_from_slice(&sums);
        entry[COUNT_SLOT] = count as f32;
    }
}

fn locate_groups(
    kernel: KernelId,
    image: &Image,
    grid: &GroupGrid,
    results: &mut [f32],
    coords: &mut [i32],
) -> Result<()> {
    let direction = direction(kernel)?;
    let reduction = kernel.reduction();
    let desc = image.desc();

    for group in 0..grid.group_count() {
        let (xs, ys) = grid.group_bounds(group, desc);
        let mut best: Option<(f32, u32, u32)> = None;
        let mut count = 0u32;

        for y in ys {
            for x in xs.clone() {
                let value = reduction.transform(image.channel(x, y, 0));
                count += 1;
                match best {
                    Some((current, _, _)) if !direction.prefers(value, current) => {}
                    _ => best = Some((value, x, y)),
                }
            }
        }

        let (value, x, y) = best.unwrap_or((0.0, 0, 0));
        let entry = &mut results[group * RESULT_STRIDE..(group + 1) * RESULT_STRIDE];
        entry.fill(0.0);
        entry[0] = value;
        entry[COUNT_SLOT] = count as f32;
        coords[group * COORD_STRIDE] = x as i32;
        coords[group * COORD_STRIDE + 1] = y as i32;
    }
    Ok(())
}
