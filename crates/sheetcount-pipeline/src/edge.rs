//! Edge detection stage.
//!
//! Wraps [`crate::canny::canny`] to detect edges in a smoothed grayscale
//! image. Returns a binary image where white pixels (255) are edges and
//! black pixels (0) are background.

use image::GrayImage;

/// Minimum effective Canny threshold.
///
/// A threshold of zero would let every zero-gradient pixel qualify as
/// a weak edge. Configured thresholds below this are raised to it.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Effective `(low, high)` thresholds after clamping.
///
/// Both are raised to at least [`MIN_THRESHOLD`] and `low` is lowered
/// to at most `high`.
#[must_use]
pub fn effective_thresholds(low_threshold: f32, high_threshold: f32) -> (f32, f32) {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);
    (low, high)
}

/// Detect edges using the Canny algorithm.
///
/// Returns a binary image: 255 for edge pixels, 0 for non-edge.
///
/// Pixels whose L1 gradient magnitude is at least `high_threshold` are
/// definite edges; those between the thresholds are edges only if
/// connected to a definite edge through the 8-neighbourhood.
///
/// This is step 3 in the pipeline, between smoothing and dilation.
#[must_use = "returns the binary edge map"]
pub fn detect_edges(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let (low, high) = effective_thresholds(low_threshold, high_threshold);
    crate::canny::canny(image, low, high)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20x20 image with a sharp vertical boundary at x = 10.
    fn sharp_edge_image() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, _y| {
            if x < 10 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        })
    }

    #[test]
    fn blank_image_produces_no_edges() {
        let img = GrayImage::from_fn(20, 20, |_, _| image::Luma([128]));
        let edges = detect_edges(&img, 50.0, 150.0);
        assert_eq!(edges.width(), 20);
        assert_eq!(edges.height(), 20);
        let edge_count: u32 = edges.pixels().map(|p| u32::from(p.0[0] > 0)).sum();
        assert_eq!(edge_count, 0, "expected no edges in uniform image");
    }

    #[test]
    fn sharp_edge_detected() {
        let edges = detect_edges(&sharp_edge_image(), 50.0, 150.0);
        let edge_count: u32 = edges.pixels().map(|p| u32::from(p.0[0] > 0)).sum();
        assert!(
            edge_count > 0,
            "expected edges at sharp boundary, found none"
        );
    }

    #[test]
    fn zero_low_threshold_is_clamped_to_min() {
        let img = sharp_edge_image();
        assert_eq!(
            detect_edges(&img, 0.0, 150.0),
            detect_edges(&img, MIN_THRESHOLD, 150.0),
        );
    }

    #[test]
    fn low_above_high_is_clamped() {
        let img = sharp_edge_image();
        assert_eq!(
            detect_edges(&img, 200.0, 100.0),
            detect_edges(&img, 100.0, 100.0),
        );
    }

    #[test]
    fn effective_thresholds_keep_valid_pairs() {
        assert_eq!(effective_thresholds(50.0, 150.0), (50.0, 150.0));
        assert_eq!(effective_thresholds(0.0, 0.0), (1.0, 1.0));
    }
}
