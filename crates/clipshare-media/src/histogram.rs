//! Frame similarity measures used by the frame-difference detector.

/// Number of grey levels in a histogram.
pub const GREY_LEVELS: usize = 256;

/// Normalised grey-level histogram of raw 8-bit pixels.
pub fn grey_histogram(pixels: &[u8]) -> Vec<f32> {
    let mut histogram = vec![0f32; GREY_LEVELS];
    if pixels.is_empty() {
        return histogram;
    }
    for &p in pixels {
        histogram[p as usize] += 1.0;
    }
    let total = pixels.len() as f32;
    for bin in histogram.iter_mut() {
        *bin /= total;
    }
    histogram
}

/// Histogram intersection similarity.
///
/// Returns 1.0 for identical distributions and 0.0 for disjoint ones.
pub fn histogram_intersection(h1: &[f32], h2: &[f32]) -> f64 {
    if h1.len() != h2.len() || h1.is_empty() {
        return 0.0;
    }

    let mut intersection = 0.0f64;
    let mut sum1 = 0.0f64;
    let mut sum2 = 0.0f64;

    for (a, b) in h1.iter().zip(h2) {
        intersection += (*a as f64).min(*b as f64);
        sum1 += *a as f64;
        sum2 += *b as f64;
    }

    let denominator = sum1.min(sum2);
    if denominator > 0.0 {
        intersection / denominator
    } else {
        0.0
    }
}

/// Similarity of two encoded frames by file size, `min / max`.
///
/// A crude proxy: JPEG size tracks scene complexity, so a large jump in size
/// usually means different content.
pub fn size_ratio(a: u64, b: u64) -> f64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    if hi == 0 {
        return 1.0;
    }
    lo as f64 / hi as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_is_normalised() {
        let h = grey_histogram(&[0, 0, 255, 128]);
        assert_eq!(h.len(), GREY_LEVELS);
        assert!((h[0] - 0.5).abs() < 1e-6);
        assert!((h.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_intersection_identical() {
        let h = grey_histogram(&[10, 20, 30, 40]);
        assert!((histogram_intersection(&h, &h) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_intersection_disjoint() {
        let dark = grey_histogram(&[0; 64]);
        let bright = grey_histogram(&[255; 64]);
        assert_eq!(histogram_intersection(&dark, &bright), 0.0);
    }

    #[test]
    fn test_intersection_mismatched_lengths() {
        assert_eq!(histogram_intersection(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_size_ratio() {
        assert_eq!(size_ratio(50, 100), 0.5);
        assert_eq!(size_ratio(100, 50), 0.5);
        assert_eq!(size_ratio(0, 0), 1.0);
    }
}
