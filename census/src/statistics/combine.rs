//! Host-side merge of per-group partial results.
//!
//! Every function takes the read-back partial buffer, one
//! [`RESULT_STRIDE`]-wide entry per work-group, and runs in O(groups).
//! Accumulation happens in f64.

use crate::statistics::{COORD_STRIDE, COUNT_SLOT, ChannelValues, Direction, Extremum, RESULT_STRIDE};

fn entries(partial: &[f32]) -> impl Iterator<Item = &[f32]> {
    partial.chunks_exact(RESULT_STRIDE)
}

pub fn reduce_sum(partial: &[f32]) -> f64 {
    entries(partial).map(|entry| entry[0] as f64).sum()
}

pub fn reduce_sum_channels(partial: &[f32], channel_count: usize) -> ChannelValues {
    let mut sums = [0.0f64; 4];
    for entry in entries(partial) {
        for (sum, value) in sums.iter_mut().zip(&entry[..channel_count]) {
            *sum += *value as f64;
        }
    }
    ChannelValues::new(sums, channel_count)
}

fn total_count(partial: &[f32]) -> f64 {
    entries(partial).map(|entry| entry[COUNT_SLOT] as f64).sum()
}

/// Sum of per-group sums over the sum of per-group pixel counts.
///
/// Edge groups cover fewer pixels, so averaging per-group means would be
/// wrong. Returns 0.0 when no pixel was covered.
pub fn reduce_mean(partial: &[f32]) -> f64 {
    let count = total_count(partial);
    if count == 0.0 {
        return 0.0;
    }
    reduce_sum(partial) / count
}

/// Per-channel mean. All channels share the group pixel count.
pub fn reduce_mean_channels(partial: &[f32], channel_count: usize) -> ChannelValues {
    let count = total_count(partial);
    let sums = reduce_sum_channels(partial, channel_count);
    if count == 0.0 {
        return ChannelValues::new([0.0; 4], channel_count);
    }

    let mut means = sums.raw();
    for mean in means.iter_mut().take(channel_count) {
        *mean /= count;
    }
    ChannelValues::new(means, channel_count)
}

/// Number of non-zero pixels from per-group indicator sums.
pub fn count_non_zero(partial: &[f32]) -> u32 {
    reduce_sum(partial).round() as u32
}

pub fn reduce_min(partial: &[f32], coords: &[i32]) -> Option<Extremum> {
    reduce_extremum(partial, coords, Direction::Min)
}

pub fn reduce_max(partial: &[f32], coords: &[i32]) -> Option<Extremum> {
    reduce_extremum(partial, coords, Direction::Max)
}

/// Scans groups in ascending index and keeps the first strictly best value,
/// so ties resolve to the lowest group index. Groups without pixels, and
/// groups past the end of `coords`, are skipped. Returns `None` if no group
/// covered a pixel.
pub fn reduce_extremum(partial: &[f32], coords: &[i32], direction: Direction) -> Option<Extremum> {
    let mut best: Option<(f32, &[i32])> = None;

    for (entry, position) in entries(partial).zip(coords.chunks_exact(COORD_STRIDE)) {
        if entry[COUNT_SLOT] == 0.0 {
            continue;
        }
        let value = entry[0];
        match best {
            Some((current, _)) if !direction.prefers(value, current) => {}
            _ => best = Some((value, position)),
        }
    }

    best.map(|(value, position)| Extremum {
        value: value as f64,
        x: position[0] as u32,
        y: position[1] as u32,
    })
}
