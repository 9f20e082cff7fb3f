use thiserror::Error;

use crate::statistics::{ChannelMode, CoordMode, Reduction};

/// Errors raised by statistics operations and the accelerators behind them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Failed to allocate {bytes} bytes for '{label}'")]
    Allocation { label: &'static str, bytes: u64 },

    #[error("Kernel '{kernel}' launch failed: {reason}")]
    Launch {
        kernel: &'static str,
        reason: String,
    },

    #[error("No kernel for {reduction} with {channels} channel mode and {coords} coordinates")]
    UnsupportedKernel {
        reduction: Reduction,
        channels: ChannelMode,
        coords: CoordMode,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

impl From<wgpu::BufferAsyncError> for Error {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        Error::Gpu(e.to_string())
    }
}

impl From<bytemuck::PodCastError> for Error {
    fn from(e: bytemuck::PodCastError) -> Self {
        Error::InvalidImage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
