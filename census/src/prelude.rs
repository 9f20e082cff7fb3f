// Color formats
pub use crate::common::{ALL_FORMATS, ChannelCount, ChannelSize, ChannelType, ColorFormat};

// Error handling
pub use crate::common::{Error, Result};

// Image types
pub use crate::image::{Image, ImageBuffer, ImageDesc};

// Accelerators
pub use crate::accelerator::{Accelerator, CpuAccelerator, DeviceBuffer};

// GPU
pub use crate::gpu::{Gpu, GpuAccelerator, GpuConfig};

// Statistics
pub use crate::statistics::{ChannelValues, Extremum, Statistics};
