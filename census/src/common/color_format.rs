use crate::common::error::{Error, Result};

#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Default)]
#[repr(u8)]
pub enum ChannelCount {
    #[default]
    L = 1,
    LA = 2,
    Rgb = 3,
    Rgba = 4,
}

#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Default)]
#[repr(u8)]
pub enum ChannelSize {
    #[default]
    _8bit = 1,
    _16bit = 2,
    _32bit = 4,
}

#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Default)]
#[repr(u8)]
pub enum ChannelType {
    #[default]
    UInt,
    Float,
}

#[derive(Clone, Copy, Debug, Hash, Default, PartialEq, Eq)]
pub struct ColorFormat {
    pub channel_count: ChannelCount,
    pub channel_size: ChannelSize,
    pub channel_type: ChannelType,
}

impl ChannelCount {
    pub fn channel_count(&self) -> u8 {
        *self as u8
    }

    pub fn byte_count(&self, channel_size: ChannelSize) -> u8 {
        self.channel_count() * channel_size.byte_count()
    }
}

impl ChannelSize {
    pub fn byte_count(&self) -> u8 {
        *self as u8
    }
}

impl ColorFormat {
    pub fn byte_count(&self) -> u8 {
        self.channel_count.byte_count(self.channel_size)
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count.channel_count() as usize
    }

    pub fn is_supported(&self) -> bool {
        ALL_FORMATS.contains(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.is_supported() {
            return Err(Error::UnsupportedFormat(format!(
                "unsupported color format: {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Smallest and largest value a single channel of this format can hold.
    pub fn value_range(&self) -> (f32, f32) {
        match (self.channel_type, self.channel_size) {
            (ChannelType::UInt, ChannelSize::_8bit) => (0.0, u8::MAX as f32),
            (ChannelType::UInt, ChannelSize::_16bit) => (0.0, u16::MAX as f32),
            (ChannelType::UInt, ChannelSize::_32bit) => (0.0, u32::MAX as f32),
            (ChannelType::Float, _) => (f32::MIN, f32::MAX),
        }
    }

    /// Decodes channel `channel` of the pixel starting at `bytes[0]`.
    ///
    /// `bytes` must hold at least one full pixel.
    pub(crate) fn decode_channel(&self, bytes: &[u8], channel: usize) -> f32 {
        let size = self.channel_size.byte_count() as usize;
        let at = channel * size;
        match (self.channel_type, self.channel_size) {
            (ChannelType::UInt, ChannelSize::_8bit) => bytes[at] as f32,
            (ChannelType::UInt, ChannelSize::_16bit) => {
                u16::from_le_bytes([bytes[at], bytes[at + 1]]) as f32
            }
            (ChannelType::UInt, ChannelSize::_32bit) => {
                u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as f32
            }
            (ChannelType::Float, _) => {
                f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
            }
        }
    }

    /// Encodes `value` into channel `channel` of the pixel starting at `bytes[0]`.
    /// Integer formats saturate.
    pub(crate) fn encode_channel(&self, bytes: &mut [u8], channel: usize, value: f32) {
        let size = self.channel_size.byte_count() as usize;
        let at = channel * size;
        match (self.channel_type, self.channel_size) {
            (ChannelType::UInt, ChannelSize::_8bit) => bytes[at] = value as u8,
            (ChannelType::UInt, ChannelSize::_16bit) => {
                bytes[at..at + 2].copy_from_slice(&(value as u16).to_le_bytes())
            }
            (ChannelType::UInt, ChannelSize::_32bit) => {
                bytes[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes())
            }
            (ChannelType::Float, _) => bytes[at..at + 4].copy_from_slice(&value.to_le_bytes()),
        }
    }
}

impl From<(ChannelCount, ChannelSize, ChannelType)> for ColorFormat {
    fn from(value: (ChannelCount, ChannelSize, ChannelType)) -> Self {
        ColorFormat {
            channel_count: value.0,
            channel_size: value.1,
            channel_type: value.2,
        }
    }
}

macro_rules! define_color_formats {
    ($(($prefix:ident, $count:ident)),+ $(,)?) => {
        paste::paste! {
            impl ColorFormat {
                $(
                    pub const [<$prefix _U8>]:  ColorFormat = ColorFormat { channel_count: ChannelCount::$count, channel_size: ChannelSize::_8bit,  channel_type: ChannelType::UInt };
                    pub const [<$prefix _U16>]: ColorFormat = ColorFormat { channel_count: ChannelCount::$count, channel_size: ChannelSize::_16bit, channel_type: ChannelType::UInt };
                    pub const [<$prefix _F32>]: ColorFormat = ColorFormat { channel_count: ChannelCount::$count, channel_size: ChannelSize::_32bit, channel_type: ChannelType::Float };
                )+
            }
        }
    };
}

define_color_formats!((L, L), (LA, LA), (RGB, Rgb), (RGBA, Rgba),);

impl std::fmt::Display for ChannelCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelCount::L => write!(f, "L"),
            ChannelCount::LA => write!(f, "LA"),
            ChannelCount::Rgb => write!(f, "RGB"),
            ChannelCount::Rgba => write!(f, "RGBA"),
        }
    }
}

impl std::fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.channel_type {
            ChannelType::UInt => "u",
            ChannelType::Float => "f",
        };
        write!(
            f,
            "{} {}{}",
            self.channel_count,
            kind,
            self.channel_size.byte_count() as u32 * 8
        )
    }
}

/// All supported color formats.
pub const ALL_FORMATS: &[ColorFormat] = &[
    //
    ColorFormat::L_U8,
    ColorFormat::L_U16,
    ColorFormat::L_F32,
    //
    ColorFormat::LA_U8,
    ColorFormat::LA_U16,
    ColorFormat::LA_F32,
    //
    ColorFormat::RGB_U8,
    ColorFormat::RGB_U16,
    ColorFormat::RGB_F32,
    //
    ColorFormat::RGBA_U8,
    ColorFormat::RGBA_U16,
    ColorFormat::RGBA_F32,
];
