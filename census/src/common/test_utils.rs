//! Test utilities shared by the unit test suites.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::prelude::*;

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "warn".
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Returns a GPU context, or `None` with a message on machines without an adapter.
pub(crate) fn test_gpu() -> Option<Gpu> {
    init_tracing();
    match Gpu::with_config(&GpuConfig::from_env()) {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            eprintln!("No GPU available, skipping test: {}", e);
            None
        }
    }
}

/// Image with channels drawn uniformly from the format's practical range.
pub(crate) fn random_image(width: u32, height: u32, format: ColorFormat, seed: u64) -> ImageBuffer {
    let mut rng = StdRng::seed_from_u64(seed);
    let (lowest, highest) = match format.channel_type {
        ChannelType::UInt => format.value_range(),
        ChannelType::Float => (-100.0, 100.0),
    };
    Image::from_fn(width, height, format, |_, _, _| {
        let value = rng.random_range(lowest..=highest);
        match format.channel_type {
            ChannelType::UInt => value.round(),
            ChannelType::Float => value,
        }
    })
    .expect("valid test image")
    .into()
}

/// Visits one channel of every pixel in row-major order.
fn scan(image: &ImageBuffer, channel: usize, mut f: impl FnMut(f64, u32, u32)) {
    let image = image.image();
    let desc = image.desc();
    for y in 0..desc.height {
        for x in 0..desc.width {
            f(image.channel(x, y, channel) as f64, x, y);
        }
    }
}

/// Reference sum over one channel, computed by a direct scan.
pub(crate) fn reference_sum(image: &ImageBuffer, channel: usize, transform: impl Fn(f64) -> f64) -> f64 {
    let mut sum = 0.0;
    scan(image, channel, |v, _, _| sum += transform(v));
    sum
}

pub(crate) fn reference_mean(image: &ImageBuffer, channel: usize) -> f64 {
    reference_sum(image, channel, |v| v) / image.desc().pixel_count() as f64
}

/// Reference extremum over one channel with the first row-major position.
pub(crate) fn reference_extremum(
    image: &ImageBuffer,
    channel: usize,
    better: impl Fn(f64, f64) -> bool,
) -> (f64, u32, u32) {
    let mut best: Option<(f64, u32, u32)> = None;
    scan(image, channel, |v, x, y| match best {
        Some((current, _, _)) if !better(v, current) => {}
        _ => best = Some((v, x, y)),
    });
    best.expect("non-empty test image")
}

/// Asserts `actual` is within a relative tolerance of `expected`.
pub(crate) fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    let scale = expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance * scale,
        "expected {expected}, got {actual}"
    );
}
