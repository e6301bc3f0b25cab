//! Post-draw pixel sampling shared by the worker and the main-thread fallback.

use crate::domain::render::Dimensions;

/// Default bound of the sampling pass: the first 10 000 RGBA pixels.
pub const DEFAULT_SAMPLE_BYTES: usize = 40_000;

/// Mean of `(r + g + b) / 3` over the first `sample_bytes` bytes of RGBA data.
///
/// Returns `(average, pixels_analyzed)`. The bound is rounded down to whole
/// pixels; an empty sample yields `(0.0, 0)`.
pub fn average_brightness(rgba: &[u8], sample_bytes: usize) -> (f64, u32) {
    let bytes = sample_bytes.min(rgba.len());
    let pixels = bytes / 4;
    if pixels == 0 {
        return (0.0, 0);
    }

    let total: u64 = rgba[..pixels * 4]
        .chunks_exact(4)
        .map(|px| px[0] as u64 + px[1] as u64 + px[2] as u64)
        .sum();
    (total as f64 / 3.0 / pixels as f64, pixels as u32)
}

/// Rows of RGBA data needed to cover `sample_bytes`.
pub fn sample_rows(sample_bytes: usize, dimensions: Dimensions) -> u32 {
    if dimensions.width == 0 || dimensions.height == 0 {
        return 0;
    }
    let row_bytes = dimensions.width as usize * 4;
    let rows = sample_bytes.div_ceil(row_bytes);
    (rows as u32).min(dimensions.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_extremes() {
        let white = vec![255u8; 400];
        assert_eq!(average_brightness(&white, DEFAULT_SAMPLE_BYTES), (255.0, 100));
        let black = [0, 0, 0, 255].repeat(10);
        assert_eq!(average_brightness(&black, DEFAULT_SAMPLE_BYTES), (0.0, 10));
    }

    #[test]
    fn sample_is_bounded() {
        let mut pixels = [30u8, 60, 90, 255].repeat(20);
        pixels.extend([255u8; 80]);
        let (avg, count) = average_brightness(&pixels, 80);
        assert_eq!(count, 20);
        assert_eq!(avg, 60.0);
    }

    #[test]
    fn sample_rows_cover_the_sample() {
        let dims = Dimensions { width: 100, height: 50 };
        assert_eq!(sample_rows(40_000, dims), 50);
        assert_eq!(sample_rows(40_000, Dimensions { width: 1920, height: 1080 }), 6);
        assert_eq!(sample_rows(400, dims), 1);
        assert_eq!(sample_rows(40_000, Dimensions { width: 0, height: 10 }), 0);
    }

    #[test]
    fn partial_pixel_and_empty_input() {
        assert_eq!(average_brightness(&[10, 20, 30], 40), (0.0, 0));
        assert_eq!(average_brightness(&[], 40), (0.0, 0));
    }
}
