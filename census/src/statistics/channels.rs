use std::ops::Index;

/// Per-channel statistic values.
///
/// Always carries four slots; only the first `channel_count` are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelValues {
    values: [f64; 4],
    channel_count: usize,
}

impl ChannelValues {
    pub(crate) fn new(values: [f64; 4], channel_count: usize) -> Self {
        debug_assert!((1..=4).contains(&channel_count));
        Self {
            values,
            channel_count,
        }
    }

    pub(crate) fn from_slots(slots: &[f32], channel_count: usize) -> Self {
        let mut values = [0.0; 4];
        for (value, slot) in values.iter_mut().zip(slots) {
            *value = *slot as f64;
        }
        Self::new(values, channel_count)
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Values of the image's channels.
    pub fn as_slice(&self) -> &[f64] {
        &self.values[..self.channel_count]
    }

    pub fn get(&self, channel: usize) -> Option<f64> {
        self.as_slice().get(channel).copied()
    }

    /// All four slots, including the ones past the channel count.
    pub fn raw(&self) -> [f64; 4] {
        self.values
    }
}

impl Index<usize> for ChannelValues {
    type Output = f64;

    fn index(&self, channel: usize) -> &f64 {
        &self.as_slice()[channel]
    }
}

/// Extremum value and the pixel it was found at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    pub value: f64,
    pub x: u32,
    pub y: u32,
}
