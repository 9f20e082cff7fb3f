mod image_buffer;
mod stride;


pub use image_buffer::ImageBuffer;

use crate::common::{ColorFormat, Error, Result};

use stride::{add_stride_padding, align_stride};

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub color_format: ColorFormat,
}

/// Host image with 4-byte aligned rows.
#[derive(Clone, Debug)]
pub struct Image {
    desc: ImageDesc,
    bytes: Vec<u8>,
}

impl Image {
    /// Returns the image descriptor.
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    /// Returns the image bytes as a slice.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the image bytes as a mutable slice.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn new_empty(desc: ImageDesc) -> Result<Image> {
        desc.color_format.validate()?;

        let bytes = vec![0; desc.size_in_bytes()];

        Ok(Image { desc, bytes })
    }

    pub fn new_with_data(desc: ImageDesc, bytes: Vec<u8>) -> Result<Image> {
        desc.color_format.validate()?;

        if bytes.len() != desc.size_in_bytes() {
            return Err(Error::InvalidImage(format!(
                "bytes length {} does not match expected size {}",
                bytes.len(),
                desc.size_in_bytes()
            )));
        }

        Ok(Image { desc, bytes })
    }

    /// Creates an image from tightly packed pixel bytes, adding row padding as needed.
    pub fn from_packed(
        width: u32,
        height: u32,
        color_format: ColorFormat,
        packed: &[u8],
    ) -> Result<Image> {
        let desc = ImageDesc::new(width, height, color_format);
        let row_bytes = desc.row_bytes();
        if packed.len() != row_bytes * height as usize {
            return Err(Error::InvalidImage(format!(
                "packed length {} does not match {}x{} {}",
                packed.len(),
                width,
                height,
                color_format
            )));
        }

        let bytes = add_stride_padding(packed, height as usize, row_bytes, desc.stride);
        Image::new_with_data(desc, bytes)
    }

    /// Creates an image whose channels are produced by `f(x, y, channel)`.
    pub fn from_fn<F>(width: u32, height: u32, color_format: ColorFormat, mut f: F) -> Result<Image>
    where
        F: FnMut(u32, u32, usize) -> f32,
    {
        let mut image = Image::new_empty(ImageDesc::new(width, height, color_format))?;
        for y in 0..height {
            for x in 0..width {
                for c in 0..color_format.channel_count() {
                    image.set_channel(x, y, c, f(x, y, c));
                }
            }
        }
        Ok(image)
    }

    /// Creates an image with every channel of every pixel set to `value`.
    pub fn filled(width: u32, height: u32, color_format: ColorFormat, value: f32) -> Result<Image> {
        Image::from_fn(width, height, color_format, |_, _, _| value)
    }

    /// Returns channel `channel` of the pixel at (x, y) as f32.
    pub fn channel(&self, x: u32, y: u32, channel: usize) -> f32 {
        let offset = self.desc.pixel_offset(x, y);
        self.desc
            .color_format
            .decode_channel(&self.bytes[offset..], channel)
    }

    /// Writes channel `channel` of the pixel at (x, y). Integer formats saturate.
    pub fn set_channel(&mut self, x: u32, y: u32, channel: usize, value: f32) {
        let offset = self.desc.pixel_offset(x, y);
        self.desc
            .color_format
            .encode_channel(&mut self.bytes[offset..], channel, value);
    }

    /// Extracts one channel into a single-channel image of the same channel size and type.
    pub fn extract_channel(&self, channel: usize) -> Result<Image> {
        let format = ColorFormat {
            channel_count: crate::common::ChannelCount::L,
            ..self.desc.color_format
        };
        Image::from_fn(self.desc.width, self.desc.height, format, |x, y, _| {
            self.channel(x, y, channel)
        })
    }
}

impl ImageDesc {
    pub fn new(width: u32, height: u32, color_format: ColorFormat) -> Self {
        let stride = align_stride(width as usize * color_format.byte_count() as usize);

        Self {
            width,
            height,
            stride,
            color_format,
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        self.height as usize * self.stride
    }

    /// Returns the number of bytes per row without padding.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.color_format.byte_count() as usize
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of channels per pixel.
    pub fn channel_count(&self) -> usize {
        self.color_format.channel_count()
    }

    /// Returns true if the image has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn pixel_offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.stride + x as usize * self.color_format.byte_count() as usize
    }
}

impl std::fmt::Display for ImageDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.color_format)
    }
}
