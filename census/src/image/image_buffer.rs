use atomic_refcell::{AtomicRef, AtomicRefCell};

use crate::gpu::{Gpu, GpuImage};
use crate::prelude::*;

/// Host image plus a lazily uploaded device copy.
///
/// The host image stays authoritative: the device copy is created on first
/// use by a GPU accelerator and dropped whenever the host pixels are borrowed
/// mutably. Interior mutability lets the upload happen through a shared
/// reference. Thread-safe via AtomicRefCell.
#[derive(Debug)]
pub struct ImageBuffer {
    image: Image,
    device: AtomicRefCell<Option<GpuImage>>,
}

impl ImageBuffer {
    /// Creates a new ImageBuffer from a CPU image.
    pub fn from_cpu(image: Image) -> Self {
        Self {
            image,
            device: AtomicRefCell::new(None),
        }
    }

    /// Returns the image descriptor.
    pub fn desc(&self) -> &ImageDesc {
        self.image.desc()
    }

    pub fn width(&self) -> u32 {
        self.image.desc().width
    }

    pub fn height(&self) -> u32 {
        self.image.desc().height
    }

    pub fn channel_count(&self) -> usize {
        self.image.desc().channel_count()
    }

    /// Returns the host image.
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Returns the host image for modification, invalidating the device copy.
    pub fn image_mut(&mut self) -> &mut Image {
        *self.device.get_mut() = None;
        &mut self.image
    }

    /// Returns true if a device copy is currently resident.
    pub fn is_gpu(&self) -> bool {
        self.device.borrow().is_some()
    }

    /// Uploads the host image unless a device copy already exists.
    pub(crate) fn send_if_needed(&self, gpu: &Gpu) -> Result<()> {
        let mut device = self.device.borrow_mut();
        if device.is_none() {
            *device = Some(GpuImage::from_image(gpu, &self.image)?);
        }
        Ok(())
    }

    /// Returns the device copy, uploading it first if needed.
    pub(crate) fn make_gpu(&self, gpu: &Gpu) -> Result<AtomicRef<'_, GpuImage>> {
        self.send_if_needed(gpu)?;
        Ok(AtomicRef::map(self.device.borrow(), |d| match d {
            Some(img) => img,
            None => unreachable!("device copy is uploaded above"),
        }))
    }

    pub fn into_cpu(self) -> Image {
        self.image
    }
}

impl From<Image> for ImageBuffer {
    fn from(image: Image) -> Self {
        Self::from_cpu(image)
    }
}
