use std::marker::PhantomData;

use tracing::debug;

use crate::accelerator::{Accelerator, DeviceBuffer, Element};
use crate::prelude::*;

/// Floats per work-group in the partial-result buffer: four channels and a
/// pixel count.
pub const RESULT_STRIDE: usize = 5;
/// Slot of the pixel count inside a partial-result entry.
pub const COUNT_SLOT: usize = 4;
/// Integers per work-group in the coordinate buffer: x then y.
pub const COORD_STRIDE: usize = 2;
/// Slots in the device accumulator, one per channel.
pub const ACCUMULATOR_SLOTS: usize = 4;

/// Shape a cached buffer was last allocated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCache {
    pub group_count: usize,
    pub capacity_bytes: u64,
}

/// Element count and byte size a buffer must have for a given group count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Capacity {
    pub group_count: usize,
    pub len: usize,
    pub bytes: u64,
}

impl Capacity {
    pub fn new<T: Element>(group_count: usize, stride: usize) -> Self {
        let len = group_count * stride;
        Self {
            group_count,
            len,
            bytes: (len * size_of::<T>()) as u64,
        }
    }

    fn size_cache(&self) -> SizeCache {
        SizeCache {
            group_count: self.group_count,
            capacity_bytes: self.bytes,
        }
    }
}

/// Lazily (re)allocated buffer guarded by a [`SizeCache`] record.
#[derive(Debug)]
pub(crate) struct CachedBuffer<T: Element, B: DeviceBuffer<T>> {
    label: &'static str,
    cache: Option<SizeCache>,
    buffer: Option<B>,
    _element: PhantomData<T>,
}

impl<T: Element, B: DeviceBuffer<T>> CachedBuffer<T, B> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            cache: None,
            buffer: None,
            _element: PhantomData,
        }
    }

    pub fn size_cache(&self) -> Option<SizeCache> {
        self.cache
    }

    /// Returns a buffer matching `required`, allocating only when the cached
    /// record or the buffer itself disagrees with it.
    ///
    /// The old buffer is released before allocating. On failure the record
    /// stays cleared, so the next call retries.
    pub fn ensure<F>(&mut self, required: Capacity, allocate: F) -> Result<&mut B>
    where
        F: FnOnce(usize, &'static str) -> Result<B>,
    {
        let reusable = match (&self.cache, &self.buffer) {
            (Some(cache), Some(buffer)) => {
                *cache == required.size_cache()
                    && buffer.len() == required.len
                    && buffer.size() == required.bytes
            }
            _ => false,
        };

        let buffer = match self.buffer.take() {
            Some(buffer) if reusable => buffer,
            old => {
                debug!(
                    label = self.label,
                    from = self.cache.map(|c| c.group_count),
                    to = required.group_count,
                    bytes = required.bytes,
                    "reallocating partial buffer"
                );

                drop(old);
                self.cache = None;

                let buffer = allocate(required.len, self.label)?;
                self.cache = Some(required.size_cache());
                buffer
            }
        };

        Ok(self.buffer.insert(buffer))
    }
}

/// Per-group result and coordinate buffers owned by one statistics instance.
pub(crate) struct PartialBuffers<A: Accelerator> {
    results: CachedBuffer<f32, A::Buffer<f32>>,
    coords: CachedBuffer<i32, A::Buffer<i32>>,
}

impl<A: Accelerator> PartialBuffers<A> {
    pub fn new() -> Self {
        Self {
            results: CachedBuffer::new("partial_results"),
            coords: CachedBuffer::new("partial_coords"),
        }
    }

    pub fn results_cache(&self) -> Option<SizeCache> {
        self.results.size_cache()
    }

    pub fn coords_cache(&self) -> Option<SizeCache> {
        self.coords.size_cache()
    }

    /// Result buffer sized for `desc`.
    pub fn ensure_results(
        &mut self,
        accelerator: &mut A,
        desc: &ImageDesc,
    ) -> Result<&mut A::Buffer<f32>> {
        let required = Capacity::new::<f32>(accelerator.group_count(desc), RESULT_STRIDE);
        self.results
            .ensure(required, |len, label| accelerator.create_buffer(len, label))
    }

    /// Result and coordinate buffers sized for `desc`.
    pub fn ensure_coords(
        &mut self,
        accelerator: &mut A,
        desc: &ImageDesc,
    ) -> Result<(&mut A::Buffer<f32>, &mut A::Buffer<i32>)> {
        let group_count = accelerator.group_count(desc);

        let results = self.results.ensure(
            Capacity::new::<f32>(group_count, RESULT_STRIDE),
            |len, label| accelerator.create_buffer(len, label),
        )?;
        let coords = self.coords.ensure(
            Capacity::new::<i32>(group_count, COORD_STRIDE),
            |len, label| accelerator.create_buffer(len, label),
        )?;

        Ok((results, coords))
    }
}

/// Four-slot device buffer for extremum reductions without coordinates.
pub(crate) struct ResultAccumulator<A: Accelerator> {
    buffer: A::Buffer<f32>,
}

impl<A: Accelerator> ResultAccumulator<A> {
    pub fn new(accelerator: &mut A) -> Result<Self> {
        let buffer = accelerator.create_buffer(ACCUMULATOR_SLOTS, "accumulator")?;
        Ok(Self { buffer })
    }

    pub fn buffer_mut(&mut self) -> &mut A::Buffer<f32> {
        &mut self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeBuffer {
        len: usize,
        bytes: u64,
        data: Vec<f32>,
    }

    impl DeviceBuffer<f32> for FakeBuffer {
        fn len(&self) -> usize {
            self.len
        }

        fn size(&self) -> u64 {
            self.bytes
        }

        fn host(&mut self) -> Result<&[f32]> {
            Ok(&self.data)
        }
    }

    fn fake(len: usize, _label: &'static str) -> Result<FakeBuffer> {
        Ok(FakeBuffer {
            len,
            bytes: (len * 4) as u64,
            data: vec![0.0; len],
        })
    }

    #[test]
    fn test_capacity() {
        let capacity = Capacity::new::<f32>(12, RESULT_STRIDE);
        assert_eq!(capacity.len, 60);
        assert_eq!(capacity.bytes, 240);

        let capacity = Capacity::new::<i32>(12, COORD_STRIDE);
        assert_eq!(capacity.len, 24);
        assert_eq!(capacity.bytes, 96);
    }

    #[test]
    fn test_same_shape_reuses_buffer() {
        let mut cached = CachedBuffer::<f32, FakeBuffer>::new("results");
        let mut allocations = 0;

        for _ in 0..3 {
            cached
                .ensure(Capacity::new::<f32>(8, RESULT_STRIDE), |len, label| {
                    allocations += 1;
                    fake(len, label)
                })
                .unwrap();
        }

        assert_eq!(allocations, 1);
        assert_eq!(
            cached.size_cache(),
            Some(SizeCache {
                group_count: 8,
                capacity_bytes: 160
            })
        );
    }

    #[test]
    fn test_shape_change_reallocates() {
        let mut cached = CachedBuffer::<f32, FakeBuffer>::new("results");
        let mut allocations = 0;

        for groups in [4, 4, 9, 4] {
            let buffer = cached
                .ensure(Capacity::new::<f32>(groups, RESULT_STRIDE), |len, label| {
                    allocations += 1;
                    fake(len, label)
                })
                .unwrap();
            assert_eq!(buffer.len(), groups * RESULT_STRIDE);
        }

        assert_eq!(allocations, 3);
    }

    #[test]
    fn test_buffer_size_mismatch_reallocates() {
        let mut cached = CachedBuffer::<f32, FakeBuffer>::new("results");
        let required = Capacity::new::<f32>(2, RESULT_STRIDE);

        cached
            .ensure(required, |len, _| {
                Ok(FakeBuffer {
                    len,
                    bytes: 1,
                    data: vec![],
                })
            })
            .unwrap();

        let mut reallocated = false;
        cached
            .ensure(required, |len, label| {
                reallocated = true;
                fake(len, label)
            })
            .unwrap();
        assert!(reallocated);
    }

    #[test]
    fn test_failed_allocation_leaves_cache_unset() {
        let mut cached = CachedBuffer::<f32, FakeBuffer>::new("results");
        let required = Capacity::new::<f32>(4, RESULT_STRIDE);

        cached.ensure(required, fake).unwrap();

        let bigger = Capacity::new::<f32>(16, RESULT_STRIDE);
        let err = cached
            .ensure(bigger, |_, label| {
                Err(Error::Allocation {
                    label,
                    bytes: bigger.bytes,
                })
            })
            .unwrap_err();
        assert!(matches!(err, Error::Allocation { label: "results", .. }));
        assert_eq!(cached.size_cache(), None);

        // Same shape as before the failure still allocates: nothing is cached.
        let mut allocations = 0;
        cached
            .ensure(required, |len, label| {
                allocations += 1;
                fake(len, label)
            })
            .unwrap();
        assert_eq!(allocations, 1);
    }
}
