/// Aligns a value to 4-byte boundary.
pub(crate) fn align_stride(n: usize) -> usize {
    (n + 3) & !3
}

/// Copies tightly packed rows into a buffer with the given stride.
pub(crate) fn add_stride_padding(
    src: &[u8],
    height: usize,
    row_bytes: usize,
    stride: usize,
) -> Vec<u8> {
    if row_bytes == stride {
        return src.to_vec();
    }

    let mut padded = vec![0u8; stride * height];
    for y in 0..height {
        padded[y * stride..y * stride + row_bytes]
            .copy_from_slice(&src[y * row_bytes..y * row_bytes + row_bytes]);
    }
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_stride() {
        assert_eq!(align_stride(0), 0);
        assert_eq!(align_stride(1), 4);
        assert_eq!(align_stride(4), 4);
        assert_eq!(align_stride(9), 12);
    }

    #[test]
    fn test_add_stride_padding() {
        let packed = [1u8, 2, 3, 4, 5, 6];
        let padded = add_stride_padding(&packed, 2, 3, 4);
        assert_eq!(padded, vec![1, 2, 3, 0, 4, 5, 6, 0]);
    }
}
