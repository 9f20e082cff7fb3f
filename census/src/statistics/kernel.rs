use strum_macros::{Display, EnumIter};

use crate::prelude::*;

/// Statistic computed by a reduction kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Reduction {
    Min,
    Max,
    MinAbs,
    MaxAbs,
    Sum,
    SumSqr,
    Mean,
    MeanSqr,
    CountNonZero,
}

/// Whether a kernel reduces only the first channel or every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ChannelMode {
    Single,
    Multi,
}

/// Whether a kernel also reports where its extremum was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum CoordMode {
    Without,
    With,
}

/// Ordering an extremum reduction keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Min,
    Max,
}

/// Shape of the buffers a kernel writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Four accumulator slots combined on the device.
    Accumulator,
    /// One entry per work-group.
    Partial,
    /// One entry and one coordinate pair per work-group.
    PartialCoords,
}

impl Direction {
    /// True if `candidate` strictly beats `current`.
    pub fn prefers(self, candidate: f32, current: f32) -> bool {
        match self {
            Direction::Min => candidate < current,
            Direction::Max => candidate > current,
        }
    }
}

impl Reduction {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Reduction::Min | Reduction::MinAbs => Some(Direction::Min),
            Reduction::Max | Reduction::MaxAbs => Some(Direction::Max),
            _ => None,
        }
    }

    /// Per-channel transform applied before reducing.
    pub fn transform(self, value: f32) -> f32 {
        match self {
            Reduction::MinAbs | Reduction::MaxAbs => value.abs(),
            Reduction::SumSqr | Reduction::MeanSqr => value * value,
            Reduction::CountNonZero => {
                if value != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Reduction::Min | Reduction::Max | Reduction::Sum | Reduction::Mean => value,
        }
    }

    /// Starting value of the device accumulator for extremum reductions.
    ///
    /// Minimum searches start at the largest value the format holds, maximum
    /// searches at the smallest. Float formats start at the infinities so an
    /// infinite pixel still replaces the seed. Absolute maximum starts at zero.
    pub fn seed(self, format: ColorFormat) -> Option<f32> {
        let (lowest, highest) = match format.channel_type {
            ChannelType::UInt => format.value_range(),
            ChannelType::Float => (f32::NEG_INFINITY, f32::INFINITY),
        };
        match self {
            Reduction::Min | Reduction::MinAbs => Some(highest),
            Reduction::Max => Some(lowest),
            Reduction::MaxAbs => Some(0.0),
            _ => None,
        }
    }

    /// Numeric code baked into the device shader.
    pub(crate) fn code(self) -> u32 {
        match self {
            Reduction::Min => 0,
            Reduction::Max => 1,
            Reduction::MinAbs => 2,
            Reduction::MaxAbs => 3,
            Reduction::Sum => 4,
            Reduction::SumSqr => 5,
            Reduction::Mean => 6,
            Reduction::MeanSqr => 7,
            Reduction::CountNonZero => 8,
        }
    }
}

/// Identifier of one compiled reduction kernel.
///
/// Only combinations with an actual kernel can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId {
    reduction: Reduction,
    channels: ChannelMode,
    coords: CoordMode,
    name: &'static str,
}

impl KernelId {
    pub fn new(reduction: Reduction, channels: ChannelMode, coords: CoordMode) -> Result<Self> {
        let name = kernel_name(reduction, channels, coords).ok_or(Error::UnsupportedKernel {
            reduction,
            channels,
            coords,
        })?;

        Ok(Self {
            reduction,
            channels,
            coords,
            name,
        })
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    pub fn channels(&self) -> ChannelMode {
        self.channels
    }

    pub fn coords(&self) -> CoordMode {
        self.coords
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn output(&self) -> OutputKind {
        match (self.coords, self.reduction.direction()) {
            (CoordMode::With, _) => OutputKind::PartialCoords,
            (CoordMode::Without, Some(_)) => OutputKind::Accumulator,
            (CoordMode::Without, None) => OutputKind::Partial,
        }
    }
}

impl std::fmt::Display for KernelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

fn kernel_name(reduction: Reduction, channels: ChannelMode, coords: CoordMode) -> Option<&'static str> {
    use ChannelMode::{Multi, Single};
    use CoordMode::{With, Without};
    use Reduction::*;

    let name = match (reduction, channels, coords) {
        (Min, Single, Without) => "reduce_min",
        (Max, Single, Without) => "reduce_max",
        (MinAbs, Single, Without) => "reduce_min_abs",
        (MaxAbs, Single, Without) => "reduce_max_abs",
        (Sum, Single, Without) => "reduce_sum",
        (SumSqr, Single, Without) => "reduce_sum_sqr",
        (Mean, Single, Without) => "reduce_mean",
        (MeanSqr, Single, Without) => "reduce_mean_sqr",
        (CountNonZero, Single, Without) => "reduce_count_non_zero",

        (Min, Multi, Without) => "reduce_min_multi",
        (Max, Multi, Without) => "reduce_max_multi",
        (MinAbs, Multi, Without) => "reduce_min_abs_multi",
        (MaxAbs, Multi, Without) => "reduce_max_abs_multi",
        (Sum, Multi, Without) => "reduce_sum_multi",
        (SumSqr, Multi, Without) => "reduce_sum_sqr_multi",
        (Mean, Multi, Without) => "reduce_mean_multi",
        (MeanSqr, Multi, Without) => "reduce_mean_sqr_multi",

        (Min, Single, With) => "locate_min",
        (Max, Single, With) => "locate_max",
        (MinAbs, Single, With) => "locate_min_abs",
        (MaxAbs, Single, With) => "locate_max_abs",

        (CountNonZero, Multi, _)
        | (Sum | SumSqr | Mean | MeanSqr | CountNonZero, _, With)
        | (Min | Max | MinAbs | MaxAbs, Multi, With) => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    fn all_kernels() -> Vec<KernelId> {
        let mut kernels = Vec::new();
        for reduction in Reduction::iter() {
            for channels in ChannelMode::iter() {
                for coords in CoordMode::iter() {
                    if let Ok(kernel) = KernelId::new(reduction, channels, coords) {
                        kernels.push(kernel);
                    }
                }
            }
        }
        kernels
    }

    #[test]
    fn test_kernel_table_size_and_unique_names() {
        let kernels = all_kernels();
        assert_eq!(kernels.len(), 21);

        let names: hashbrown::HashSet<_> = kernels.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), kernels.len());
    }

    #[test]
    fn test_coordinates_only_for_single_channel_extrema() {
        for kernel in all_kernels() {
            if kernel.coords() == CoordMode::With {
                assert_eq!(kernel.channels(), ChannelMode::Single);
                assert!(kernel.reduction().direction().is_some());
                assert_eq!(kernel.output(), OutputKind::PartialCoords);
            }
        }
    }

    #[test]
    fn test_unsupported_combinations() {
        let err =
            KernelId::new(Reduction::CountNonZero, ChannelMode::Multi, CoordMode::Without).unwrap_err();
        assert!(matches!(err, Error::UnsupportedKernel { .. }));

        assert!(KernelId::new(Reduction::Max, ChannelMode::Multi, CoordMode::With).is_err());
        assert!(KernelId::new(Reduction::Mean, ChannelMode::Single, CoordMode::With).is_err());
    }

    #[test]
    fn test_output_kinds() {
        let min = KernelId::new(Reduction::Min, ChannelMode::Multi, CoordMode::Without).unwrap();
        assert_eq!(min.output(), OutputKind::Accumulator);

        let mean = KernelId::new(Reduction::Mean, ChannelMode::Multi, CoordMode::Without).unwrap();
        assert_eq!(mean.output(), OutputKind::Partial);
        assert_eq!(mean.to_string(), "reduce_mean_multi");
    }

    #[test]
    fn test_seeds() {
        assert_eq!(Reduction::Min.seed(ColorFormat::L_U8), Some(255.0));
        assert_eq!(Reduction::Max.seed(ColorFormat::L_U16), Some(0.0));
        assert_eq!(Reduction::Max.seed(ColorFormat::L_F32), Some(f32::NEG_INFINITY));
        assert_eq!(Reduction::Min.seed(ColorFormat::RGBA_F32), Some(f32::INFINITY));
        assert_eq!(Reduction::MinAbs.seed(ColorFormat::L_F32), Some(f32::INFINITY));
        assert_eq!(Reduction::MaxAbs.seed(ColorFormat::L_F32), Some(0.0));
        assert_eq!(Reduction::Sum.seed(ColorFormat::L_F32), None);
    }

    #[test]
    fn test_transform() {
        assert_eq!(Reduction::MinAbs.transform(-3.0), 3.0);
        assert_eq!(Reduction::SumSqr.transform(-3.0), 9.0);
        assert_eq!(Reduction::CountNonZero.transform(-0.5), 1.0);
        assert_eq!(Reduction::CountNonZero.transform(0.0), 0.0);
        assert_eq!(Reduction::Mean.transform(-3.0), -3.0);
    }

    #[test]
    fn test_shader_codes_are_distinct() {
        let codes: hashbrown::HashSet<_> = Reduction::iter().map(Reduction::code).collect();
        assert_eq!(codes.len(), 9);
    }
}
