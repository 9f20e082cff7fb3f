//! Image statistics computed as a two-stage reduction.
//!
//! An [`Accelerator`] reduces every work-group of the image into one
//! partial entry, then the host merges the entries in [`combine`]. Extrema
//! without coordinates skip the host stage: the device folds every pixel
//! into a 4-slot accumulator.
//!
//! ```no_run
//! use census::prelude::*;
//!
//! let image = Image::filled(640, 480, ColorFormat::L_F32, 2.0)?;
//! let image = ImageBuffer::from_cpu(image);
//!
//! let mut stats = Statistics::new(CpuAccelerator::new())?;
//! assert_eq!(stats.sum(&image)?, 2.0 * 640.0 * 480.0);
//! # Ok::<(), census::Error>(())
//! ```

mod buffers;
mod channels;
pub mod combine;
mod dispatch;
mod kernel;

#[cfg(test)]
mod tests;

pub use buffers::{ACCUMULATOR_SLOTS, COORD_STRIDE, COUNT_SLOT, RESULT_STRIDE, SizeCache};
pub use channels::{ChannelValues, Extremum};
pub use kernel::{ChannelMode, CoordMode, Direction, KernelId, OutputKind, Reduction};

use crate::accelerator::{Accelerator, CpuAccelerator, DeviceBuffer};
use crate::gpu::{GpuAccelerator, GpuConfig};
use crate::prelude::*;

use buffers::{PartialBuffers, ResultAccumulator};

/// Statistics over images on one accelerator.
///
/// Owns the partial-result buffers and reuses them while successive images
/// split into the same number of work-groups. Every operation blocks until
/// its results are back on the host.
pub struct Statistics<A: Accelerator> {
    accelerator: A,
    partials: PartialBuffers<A>,
    accumulator: ResultAccumulator<A>,
}

impl<A: Accelerator> Statistics<A> {
    pub fn new(mut accelerator: A) -> Result<Self> {
        let accumulator = ResultAccumulator::new(&mut accelerator)?;
        Ok(Self {
            accelerator,
            partials: PartialBuffers::new(),
            accumulator,
        })
    }

    pub fn accelerator(&self) -> &A {
        &self.accelerator
    }

    pub fn into_accelerator(self) -> A {
        self.accelerator
    }

    /// Number of work-groups `image` is reduced in.
    pub fn group_count(&self, image: &ImageBuffer) -> usize {
        self.accelerator.group_count(image.desc())
    }

    /// Shape the partial-result buffer is currently allocated for.
    pub fn results_cache(&self) -> Option<SizeCache> {
        self.partials.results_cache()
    }

    /// Shape the coordinate buffer is currently allocated for.
    pub fn coords_cache(&self) -> Option<SizeCache> {
        self.partials.coords_cache()
    }

    pub fn min(&mut self, image: &ImageBuffer) -> Result<f64> {
        Ok(self.accumulate(image, Reduction::Min, ChannelMode::Single)?[0] as f64)
    }

    pub fn max(&mut self, image: &ImageBuffer) -> Result<f64> {
        Ok(self.accumulate(image, Reduction::Max, ChannelMode::Single)?[0] as f64)
    }

    pub fn min_abs(&mut self, image: &ImageBuffer) -> Result<f64> {
        Ok(self.accumulate(image, Reduction::MinAbs, ChannelMode::Single)?[0] as f64)
    }

    pub fn max_abs(&mut self, image: &ImageBuffer) -> Result<f64> {
        Ok(self.accumulate(image, Reduction::MaxAbs, ChannelMode::Single)?[0] as f64)
    }

    pub fn min_channels(&mut self, image: &ImageBuffer) -> Result<ChannelValues> {
        self.accumulate_channels(image, Reduction::Min)
    }

    pub fn max_channels(&mut self, image: &ImageBuffer) -> Result<ChannelValues> {
        self.accumulate_channels(image, Reduction::Max)
    }

    pub fn min_abs_channels(&mut self, image: &ImageBuffer) -> Result<ChannelValues> {
        self.accumulate_channels(image, Reduction::MinAbs)
    }

    pub fn max_abs_channels(&mut self, image: &ImageBuffer) -> Result<ChannelValues> {
        self.accumulate_channels(image, Reduction::MaxAbs)
    }

    /// Minimum of the first channel and the pixel holding it.
    ///
    /// When several work-groups hold the minimum, the lowest-indexed group
    /// wins; inside a group the first pixel in row-major order wins.
    pub fn min_coord(&mut self, image: &ImageBuffer) -> Result<Extremum> {
        self.locate(image, Reduction::Min)
    }

    pub fn max_coord(&mut self, image: &ImageBuffer) -> Result<Extremum> {
        self.locate(image, Reduction::Max)
    }

    pub fn min_abs_coord(&mut self, image: &ImageBuffer) -> Result<Extremum> {
        self.locate(image, Reduction::MinAbs)
    }

    pub fn max_abs_coord(&mut self, image: &ImageBuffer) -> Result<Extremum> {
        self.locate(image, Reduction::MaxAbs)
    }

    pub fn sum(&mut self, image: &ImageBuffer) -> Result<f64> {
        let partial = self.partial(image, Reduction::Sum, ChannelMode::Single)?;
        Ok(combine::reduce_sum(partial))
    }

    pub fn sum_channels(&mut self, image: &ImageBuffer) -> Result<ChannelValues> {
        let channel_count = image.channel_count();
        let partial = self.partial(image, Reduction::Sum, ChannelMode::Multi)?;
        Ok(combine::reduce_sum_channels(partial, channel_count))
    }

    pub fn sum_sqr(&mut self, image: &ImageBuffer) -> Result<f64> {
        let partial = self.partial(image, Reduction::SumSqr, ChannelMode::Single)?;
        Ok(combine::reduce_sum(partial))
    }

    pub fn sum_sqr_channels(&mut self, image: &ImageBuffer) -> Result<ChannelValues> {
        let channel_count = image.channel_count();
        let partial = self.partial(image, Reduction::SumSqr, ChannelMode::Multi)?;
        Ok(combine::reduce_sum_channels(partial, channel_count))
    }

    pub fn mean(&mut self, image: &ImageBuffer) -> Result<f64> {
        let partial = self.partial(image, Reduction::Mean, ChannelMode::Single)?;
        Ok(combine::reduce_mean(partial))
    }

    pub fn mean_channels(&mut self, image: &ImageBuffer) -> Result<ChannelValues> {
        let channel_count = image.channel_count();
        let partial = self.partial(image, Reduction::Mean, ChannelMode::Multi)?;
        Ok(combine::reduce_mean_channels(partial, channel_count))
    }

    pub fn mean_sqr(&mut self, image: &ImageBuffer) -> Result<f64> {
        let partial = self.partial(image, Reduction::MeanSqr, ChannelMode::Single)?;
        Ok(combine::reduce_mean(partial))
    }

    pub fn mean_sqr_channels(&mut self, image: &ImageBuffer) -> Result<ChannelValues> {
        let channel_count = image.channel_count();
        let partial = self.partial(image, Reduction::MeanSqr, ChannelMode::Multi)?;
        Ok(combine::reduce_mean_channels(partial, channel_count))
    }

    /// Number of pixels whose first channel is not zero.
    pub fn count_non_zero(&mut self, image: &ImageBuffer) -> Result<u32> {
        let partial = self.partial(image, Reduction::CountNonZero, ChannelMode::Single)?;
        Ok(combine::count_non_zero(partial))
    }

    fn prepare(&mut self, image: &ImageBuffer) -> Result<()> {
        let desc = image.desc();
        if desc.is_empty() {
            return Err(Error::EmptyImage {
                width: desc.width,
                height: desc.height,
            });
        }
        self.accelerator.send_if_needed(image)
    }

    fn accumulate(
        &mut self,
        image: &ImageBuffer,
        reduction: Reduction,
        channels: ChannelMode,
    ) -> Result<[f32; ACCUMULATOR_SLOTS]> {
        self.prepare(image)?;

        let accumulator = self.accumulator.buffer_mut();
        dispatch::dispatch_accumulate(
            &mut self.accelerator,
            reduction,
            channels,
            image,
            accumulator,
        )?;
        self.accelerator.read(accumulator, true)?;

        let mut slots = [0.0; ACCUMULATOR_SLOTS];
        slots.copy_from_slice(&accumulator.host()?[..ACCUMULATOR_SLOTS]);
        Ok(slots)
    }

    fn accumulate_channels(
        &mut self,
        image: &ImageBuffer,
        reduction: Reduction,
    ) -> Result<ChannelValues> {
        let slots = self.accumulate(image, reduction, ChannelMode::Multi)?;
        Ok(ChannelValues::from_slots(&slots, image.channel_count()))
    }

    fn partial(
        &mut self,
        image: &ImageBuffer,
        reduction: Reduction,
        channels: ChannelMode,
    ) -> Result<&[f32]> {
        self.prepare(image)?;

        let results = self
            .partials
            .ensure_results(&mut self.accelerator, image.desc())?;
        dispatch::dispatch_partial(&mut self.accelerator, reduction, channels, image, results)?;
        self.accelerator.read(results, true)?;

        results.host()
    }

    fn locate(&mut self, image: &ImageBuffer, reduction: Reduction) -> Result<Extremum> {
        self.prepare(image)?;

        let (results, coords) = self
            .partials
            .ensure_coords(&mut self.accelerator, image.desc())?;
        dispatch::dispatch_coords(&mut self.accelerator, reduction, image, results, coords)?;
        // The coordinate read blocks, which also completes the result read.
        self.accelerator.read(results, false)?;
        self.accelerator.read(coords, true)?;

        let partial = results.host()?;
        let coords = coords.host()?;
        let direction = reduction.direction().ok_or(Error::UnsupportedKernel {
            reduction,
            channels: ChannelMode::Single,
            coords: CoordMode::With,
        })?;

        let desc = image.desc();
        combine::reduce_extremum(partial, coords, direction).ok_or(Error::EmptyImage {
            width: desc.width,
            height: desc.height,
        })
    }
}

impl Statistics<CpuAccelerator> {
    /// Statistics on the host reference accelerator.
    pub fn cpu() -> Result<Self> {
        Self::new(CpuAccelerator::new())
    }
}

impl Statistics<GpuAccelerator> {
    /// Statistics on the default GPU adapter.
    pub fn gpu() -> Result<Self> {
        Self::new(GpuAccelerator::from_config(&GpuConfig::from_env())?)
    }
}
