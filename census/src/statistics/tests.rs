use crate::common::test_utils::{
    assert_close, init_tracing, random_image, reference_extremum, reference_mean, reference_sum,
};
use crate::prelude::*;
use crate::statistics::{RESULT_STRIDE, SizeCache};

fn stats(group_size: u32) -> Statistics<CpuAccelerator> {
    init_tracing();
    Statistics::new(CpuAccelerator::with_group_size(group_size)).unwrap()
}

fn buffer(image: Image) -> ImageBuffer {
    ImageBuffer::from_cpu(image)
}

#[test]
fn test_sum_of_constant_image() {
    let mut stats = stats(16);
    for (width, height) in [(1, 1), (16, 16), (37, 5), (100, 61)] {
        let image = buffer(Image::filled(width, height, ColorFormat::L_U8, 3.0).unwrap());
        assert_eq!(stats.sum(&image).unwrap(), 3.0 * (width * height) as f64);
    }
}

#[test]
fn test_mean_weights_partial_edge_groups() {
    // 10x10 with 4x4 groups: edge groups hold 8 or 4 pixels, not 16.
    let mut stats = stats(4);
    let image = buffer(
        Image::from_fn(10, 10, ColorFormat::L_F32, |x, y, _| (x * x + 3 * y) as f32).unwrap(),
    );
    assert_eq!(stats.group_count(&image), 9);

    let expected = reference_mean(&image, 0);
    assert_close(stats.mean(&image).unwrap(), expected, 1e-12);

    // The unweighted average of per-group means would differ.
    let grid = crate::accelerator::GroupGrid::new(image.desc(), 4);
    let mut mean_of_means = 0.0;
    for g in 0..grid.group_count() {
        let (xs, ys) = grid.group_bounds(g, image.desc());
        let mut sum = 0.0;
        let mut count = 0.0;
        for y in ys {
            for x in xs.clone() {
                sum += image.image().channel(x, y, 0) as f64;
                count += 1.0;
            }
        }
        mean_of_means += sum / count;
    }
    mean_of_means /= grid.group_count() as f64;
    assert!((mean_of_means - expected).abs() > 1.0);
}

#[test]
fn test_single_extreme_pixel_is_found() {
    let mut stats = stats(8);
    let mut image = Image::filled(40, 30, ColorFormat::L_F32, 5.0).unwrap();
    image.set_channel(27, 19, 0, f32::MIN);
    let image = buffer(image);

    assert_eq!(stats.min(&image).unwrap(), f32::MIN as f64);
    assert_eq!(
        stats.min_coord(&image).unwrap(),
        Extremum {
            value: f32::MIN as f64,
            x: 27,
            y: 19
        }
    );
    assert_eq!(stats.max(&image).unwrap(), 5.0);
}

#[test]
fn test_extrema_of_u8_image() {
    let mut stats = stats(16);
    let mut image = Image::filled(20, 20, ColorFormat::L_U8, 100.0).unwrap();
    image.set_channel(3, 17, 0, 255.0);
    image.set_channel(11, 2, 0, 0.0);
    let image = buffer(image);

    assert_eq!(stats.max(&image).unwrap(), 255.0);
    assert_eq!(stats.min(&image).unwrap(), 0.0);
    assert_eq!(stats.min_abs(&image).unwrap(), 0.0);
    assert_eq!(stats.max_abs(&image).unwrap(), 255.0);
    assert_eq!(stats.max_coord(&image).unwrap(), Extremum { value: 255.0, x: 3, y: 17 });
}

#[test]
fn test_ties_resolve_to_lowest_group() {
    // 8x8 with 4x4 groups: group 0 top-left, 1 top-right, 2 bottom-left.
    let mut stats = stats(4);
    let mut image = Image::filled(8, 8, ColorFormat::L_F32, 1.0).unwrap();
    // Row-major first would be (6, 0) in group 1; group 0 holds (1, 3).
    image.set_channel(6, 0, 0, -2.0);
    image.set_channel(1, 3, 0, -2.0);
    image.set_channel(0, 5, 0, -2.0);
    let image = buffer(image);

    let first = stats.min_coord(&image).unwrap();
    assert_eq!(first, Extremum { value: -2.0, x: 1, y: 3 });
    for _ in 0..3 {
        assert_eq!(stats.min_coord(&image).unwrap(), first);
    }
}

#[test]
fn test_ties_inside_group_resolve_to_first_pixel() {
    let mut stats = stats(8);
    let mut image = Image::filled(8, 8, ColorFormat::L_U16, 10.0).unwrap();
    image.set_channel(5, 2, 0, 900.0);
    image.set_channel(2, 4, 0, 900.0);
    image.set_channel(7, 2, 0, 900.0);
    let image = buffer(image);

    assert_eq!(stats.max_coord(&image).unwrap(), Extremum { value: 900.0, x: 5, y: 2 });
}

#[test]
fn test_abs_coordinates() {
    let mut stats = stats(4);
    let mut image = Image::filled(9, 9, ColorFormat::L_F32, 3.0).unwrap();
    image.set_channel(8, 8, 0, -50.0);
    image.set_channel(4, 1, 0, 40.0);
    image.set_channel(2, 6, 0, -0.5);
    let image = buffer(image);

    assert_eq!(stats.max_abs_coord(&image).unwrap(), Extremum { value: 50.0, x: 8, y: 8 });
    assert_eq!(stats.min_abs_coord(&image).unwrap(), Extremum { value: 0.5, x: 2, y: 6 });
    assert_eq!(stats.min(&image).unwrap(), -50.0);
    assert_eq!(stats.max_abs(&image).unwrap(), 50.0);
    assert_eq!(stats.min_abs(&image).unwrap(), 0.5);
}

#[test]
fn test_infinite_extrema_match_coordinates() {
    let mut stats = stats(4);

    let image = buffer(Image::filled(8, 8, ColorFormat::L_F32, f32::NEG_INFINITY).unwrap());
    assert_eq!(stats.max(&image).unwrap(), f64::NEG_INFINITY);
    assert_eq!(stats.max(&image).unwrap(), stats.max_coord(&image).unwrap().value);
    assert_eq!(stats.max_abs(&image).unwrap(), f64::INFINITY);

    let mut image = Image::filled(8, 8, ColorFormat::L_F32, f32::INFINITY).unwrap();
    image.set_channel(6, 5, 0, f32::NEG_INFINITY);
    let image = buffer(image);
    assert_eq!(stats.min(&image).unwrap(), f64::NEG_INFINITY);
    assert_eq!(stats.max(&image).unwrap(), f64::INFINITY);
    assert_eq!(stats.min_abs(&image).unwrap(), f64::INFINITY);
    assert_eq!(
        stats.min_abs(&image).unwrap(),
        stats.min_abs_coord(&image).unwrap().value
    );

    let image = buffer(Image::filled(8, 8, ColorFormat::RGB_F32, f32::INFINITY).unwrap());
    assert_eq!(stats.min(&image).unwrap(), f64::INFINITY);
    assert_eq!(stats.min(&image).unwrap(), stats.min_coord(&image).unwrap().value);
    assert_eq!(stats.min_channels(&image).unwrap().as_slice(), &[f64::INFINITY; 3]);
}

#[test]
fn test_same_shape_does_not_reallocate() {
    let mut stats = stats(16);
    let mut image = buffer(Image::filled(64, 48, ColorFormat::L_F32, 1.0).unwrap());

    // The accumulator is allocated up front.
    assert_eq!(stats.accelerator().allocation_count(), 1);

    assert_eq!(stats.sum(&image).unwrap(), 3072.0);
    assert_eq!(stats.accelerator().allocation_count(), 2);
    assert_eq!(
        stats.results_cache(),
        Some(SizeCache {
            group_count: 12,
            capacity_bytes: (12 * RESULT_STRIDE * 4) as u64
        })
    );

    image.image_mut().set_channel(0, 0, 0, 11.0);
    assert_eq!(stats.sum(&image).unwrap(), 3082.0);
    assert_eq!(stats.mean(&image).unwrap(), 3082.0 / 3072.0);

    // A different image of the same shape reuses the buffer too.
    let other = buffer(Image::filled(64, 48, ColorFormat::RGBA_U8, 2.0).unwrap());
    assert_eq!(stats.sum_channels(&other).unwrap().as_slice(), &[6144.0; 4]);
    assert_eq!(stats.accelerator().allocation_count(), 2);

    // Extrema without coordinates never touch the partial buffers.
    assert_eq!(stats.max(&image).unwrap(), 11.0);
    assert_eq!(stats.accelerator().allocation_count(), 2);
    assert_eq!(stats.coords_cache(), None);
}

#[test]
fn test_shape_change_reallocates() {
    let mut stats = stats(16);
    let small = buffer(Image::filled(16, 16, ColorFormat::L_U8, 1.0).unwrap());
    let large = buffer(Image::filled(33, 16, ColorFormat::L_U8, 1.0).unwrap());
    // Same group count as `small` despite a different size.
    let narrow = buffer(Image::filled(10, 3, ColorFormat::L_U8, 1.0).unwrap());

    assert_eq!(stats.sum(&small).unwrap(), 256.0);
    assert_eq!(stats.sum(&large).unwrap(), 528.0);
    assert_eq!(stats.results_cache().unwrap().group_count, 3);
    assert_eq!(stats.sum(&small).unwrap(), 256.0);
    assert_eq!(stats.accelerator().allocation_count(), 4);

    assert_eq!(stats.sum(&narrow).unwrap(), 30.0);
    assert_eq!(stats.accelerator().allocation_count(), 4);
}

#[test]
fn test_coordinates_ensure_both_buffers() {
    let mut stats = stats(4);
    let image = buffer(Image::filled(8, 4, ColorFormat::L_U8, 1.0).unwrap());

    stats.min_coord(&image).unwrap();
    assert_eq!(stats.results_cache().unwrap().group_count, 2);
    assert_eq!(
        stats.coords_cache(),
        Some(SizeCache {
            group_count: 2,
            capacity_bytes: 16
        })
    );
    let allocations = stats.accelerator().allocation_count();

    stats.sum(&image).unwrap();
    stats.max_coord(&image).unwrap();
    assert_eq!(stats.accelerator().allocation_count(), allocations);
}

#[test]
fn test_failed_allocation_is_retried() {
    let stats = stats(16);
    let image = buffer(Image::filled(20, 20, ColorFormat::L_U8, 2.0).unwrap());

    let mut accelerator = stats.into_accelerator();
    accelerator.fail_allocations(true);
    assert!(matches!(
        Statistics::new(accelerator),
        Err(Error::Allocation { label: "accumulator", .. })
    ));

    let mut stats = self::stats(16);
    stats.accelerator.fail_allocations(true);
    let err = stats.sum(&image).unwrap_err();
    assert!(matches!(err, Error::Allocation { label: "partial_results", .. }));
    assert_eq!(stats.results_cache(), None);

    stats.accelerator.fail_allocations(false);
    assert_eq!(stats.sum(&image).unwrap(), 800.0);
    assert!(stats.results_cache().is_some());
}

#[test]
fn test_count_non_zero_half_image() {
    let mut stats = stats(16);
    let image = buffer(
        Image::from_fn(64, 30, ColorFormat::L_U8, |x, _, _| if x < 32 { 0.0 } else { 7.0 })
            .unwrap(),
    );
    assert_eq!(stats.count_non_zero(&image).unwrap(), 64 * 30 / 2);

    let image = buffer(
        Image::from_fn(17, 9, ColorFormat::L_F32, |x, y, _| ((x + y) % 3) as f32 - 1.0).unwrap(),
    );
    let expected = reference_sum(&image, 0, |v| if v != 0.0 { 1.0 } else { 0.0 });
    assert_eq!(stats.count_non_zero(&image).unwrap() as f64, expected);
}

#[test]
fn test_sum_channels_matches_single_channel_sums() {
    let mut stats = stats(8);
    let image = random_image(29, 23, ColorFormat::RGB_U16, 11);
    let sums = stats.sum_channels(&image).unwrap();
    assert_eq!(sums.channel_count(), 3);

    for c in 0..3 {
        let isolated = buffer(image.image().extract_channel(c).unwrap());
        assert_eq!(sums[c], stats.sum(&isolated).unwrap());
        assert_eq!(sums[c], reference_sum(&image, c, |v| v));
    }
}

#[test]
fn test_per_channel_extrema_and_means() {
    let mut stats = stats(4);
    let image = buffer(
        Image::from_fn(7, 5, ColorFormat::RGBA_F32, |x, y, c| {
            (x as f32 - 3.0) * (c as f32 + 1.0) + y as f32
        })
        .unwrap(),
    );

    let mins = stats.min_channels(&image).unwrap();
    let maxs = stats.max_channels(&image).unwrap();
    let min_abs = stats.min_abs_channels(&image).unwrap();
    let max_abs = stats.max_abs_channels(&image).unwrap();
    let means = stats.mean_channels(&image).unwrap();
    let mean_sqr = stats.mean_sqr_channels(&image).unwrap();
    let sum_sqr = stats.sum_sqr_channels(&image).unwrap();

    for c in 0..4 {
        let (min, _, _) = reference_extremum(&image, c, |a, b| a < b);
        let (max, _, _) = reference_extremum(&image, c, |a, b| a > b);
        let abs = buffer(
            Image::from_fn(7, 5, ColorFormat::L_F32, |x, y, _| image.image().channel(x, y, c).abs())
                .unwrap(),
        );
        let (abs_min, _, _) = reference_extremum(&abs, 0, |a, b| a < b);
        let (abs_max, _, _) = reference_extremum(&abs, 0, |a, b| a > b);

        assert_eq!(mins[c], min);
        assert_eq!(maxs[c], max);
        assert_eq!(min_abs[c], abs_min);
        assert_eq!(max_abs[c], abs_max);
        assert_close(means[c], reference_mean(&image, c), 1e-9);

        let squares = reference_sum(&image, c, |v| v * v);
        assert_close(sum_sqr[c], squares, 1e-9);
        assert_close(mean_sqr[c], squares / 35.0, 1e-9);
    }
}

#[test]
fn test_scalar_forms_use_first_channel() {
    let mut stats = stats(16);
    let image = buffer(
        Image::from_fn(6, 6, ColorFormat::LA_U8, |x, _, c| if c == 0 { x as f32 } else { 200.0 })
            .unwrap(),
    );

    assert_eq!(stats.max(&image).unwrap(), 5.0);
    assert_eq!(stats.sum(&image).unwrap(), 90.0);
    assert_eq!(stats.sum_sqr(&image).unwrap(), 330.0);
    assert_eq!(stats.mean(&image).unwrap(), 2.5);
    assert_eq!(stats.mean_sqr(&image).unwrap(), 330.0 / 36.0);
    assert_eq!(stats.max_channels(&image).unwrap().as_slice(), &[5.0, 200.0]);
}

#[test]
fn test_random_images_match_full_scan() {
    let mut stats = stats(16);
    for (i, format) in ALL_FORMATS.iter().enumerate() {
        let image = random_image(45, 19, *format, 42 + i as u64);

        let (min, min_x, min_y) = reference_extremum(&image, 0, |a, b| a < b);
        let (max, max_x, max_y) = reference_extremum(&image, 0, |a, b| a > b);
        assert_eq!(stats.min(&image).unwrap(), min, "{format}");
        assert_eq!(stats.max(&image).unwrap(), max, "{format}");
        // Both extrema are unique with overwhelming probability only for floats.
        if format.channel_type == ChannelType::Float {
            assert_eq!(stats.min_coord(&image).unwrap(), Extremum { value: min, x: min_x, y: min_y });
            assert_eq!(stats.max_coord(&image).unwrap(), Extremum { value: max, x: max_x, y: max_y });
        }

        assert_close(stats.sum(&image).unwrap(), reference_sum(&image, 0, |v| v), 1e-5);
        assert_close(stats.mean(&image).unwrap(), reference_mean(&image, 0), 1e-5);
    }
}

#[test]
fn test_empty_image_is_rejected() {
    let mut stats = stats(16);
    let image = buffer(Image::new_empty(ImageDesc::new(0, 5, ColorFormat::L_U8)).unwrap());

    assert!(matches!(
        stats.sum(&image),
        Err(Error::EmptyImage { width: 0, height: 5 })
    ));
    assert!(matches!(stats.min(&image), Err(Error::EmptyImage { .. })));
    assert!(matches!(stats.max_coord(&image), Err(Error::EmptyImage { .. })));
    assert_eq!(stats.results_cache(), None);
    assert_eq!(stats.accelerator().launch_count(), 0);
}

#[test]
fn test_convenience_constructor() {
    let mut stats = Statistics::cpu().unwrap();
    let image = buffer(Image::filled(3, 3, ColorFormat::L_U8, 1.0).unwrap());
    assert_eq!(stats.group_count(&image), 1);
    assert_eq!(stats.count_non_zero(&image).unwrap(), 9);
}
