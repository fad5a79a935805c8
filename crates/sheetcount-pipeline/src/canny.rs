//! Canny edge detection on an already-smoothed grayscale image.
//!
//! Structured like `imageproc::edges::canny` (gradients, non-maximum
//! suppression, hysteresis) with these differences:
//!
//! 1. **No internal blur**: smoothing is a separate pipeline stage with
//!    its own kernel size, so running another Gaussian here would
//!    double-smooth.
//! 2. **L1 gradient magnitude**: `|gx| + |gy|` on the raw 3x3 Sobel
//!    responses, so the thresholds are on the same scale as the common
//!    `(50, 150)` defaults.
//! 3. **Every pixel is visited**: neighbours outside the image have
//!    magnitude 0 during suppression instead of the one-pixel border
//!    being dropped.
//! 4. **Asymmetric suppression**: a pixel must strictly exceed the
//!    neighbour behind it and at least equal the one ahead, so a
//!    two-pixel magnitude plateau thins to a single pixel.
//! 5. **Bounded 8-neighbour hysteresis**: all eight neighbours are
//!    checked and coordinates are bounds-checked before access (see
//!    <https://github.com/image-rs/imageproc/issues/705>).

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel;

/// `tan(22.5°)` in Q15 fixed point.
const TAN_22_5_Q15: i64 = 13573;

/// Pixel classification after non-maximum suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    /// Suppressed or below the low threshold.
    None,
    /// Local maximum with `low <= magnitude < high`.
    Weak,
    /// Local maximum with `magnitude >= high`.
    Strong,
}

/// Runs Canny edge detection.
///
/// Returns a binary image (255 = edge, 0 = background) of the same size
/// as `image`. Callers are expected to have checked
/// `low_threshold <= high_threshold`.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
        return GrayImage::new(w, h);
    }

    // 1. Intensity of gradients.
    let gx: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_VERTICAL_3X3);
    let gx = gx.into_raw();
    let gy = gy.into_raw();
    let magnitude: Vec<i32> = gx
        .iter()
        .zip(gy.iter())
        .map(|(&dx, &dy)| i32::from(dx).abs() + i32::from(dy).abs())
        .collect();

    // 2. Non-maximum suppression (make edges thinner) and classification.
    let grid = Grid { w, h };
    let classes = non_maximum_suppression(
        grid,
        &magnitude,
        &gx,
        &gy,
        low_threshold,
        high_threshold,
    );

    // 3. Hysteresis to keep weak edges only when linked to strong ones.
    hysteresis(grid, &classes)
}

/// Image extent shared by the suppression and linking passes.
#[derive(Debug, Clone, Copy)]
struct Grid {
    w: u32,
    h: u32,
}

impl Grid {
    /// Row-major index of an in-range coordinate, `None` otherwise.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn index(self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.w) || y >= i64::from(self.h) {
            return None;
        }
        Some((y * i64::from(self.w) + x) as usize)
    }
}

/// Finds local maxima along the quantised gradient direction and
/// classifies them against the thresholds.
fn non_maximum_suppression(
    grid: Grid,
    magnitude: &[i32],
    gx: &[i16],
    gy: &[i16],
    low_threshold: f32,
    high_threshold: f32,
) -> Vec<Class> {
    let mag_at = |x: i64, y: i64| grid.index(x, y).map_or(0, |i| magnitude[i]);

    let mut out = vec![Class::None; magnitude.len()];
    for y in 0..i64::from(grid.h) {
        for x in 0..i64::from(grid.w) {
            let Some(i) = grid.index(x, y) else {
                continue;
            };
            let m = magnitude[i];
            #[allow(clippy::cast_precision_loss)]
            let mf = m as f32;
            if mf < low_threshold || m == 0 {
                continue;
            }

            let dx = i64::from(gx[i]);
            let dy = i64::from(gy[i]);
            let (ax, ay) = (dx.abs(), dy.abs());
            let tg22x = ax * TAN_22_5_Q15;
            let y_shifted = ay << 15;

            let is_max = if y_shifted < tg22x {
                // Near-horizontal gradient: compare left and right.
                m > mag_at(x - 1, y) && m >= mag_at(x + 1, y)
            } else {
                let tg67x = tg22x + (ax << 16);
                if y_shifted > tg67x {
                    // Near-vertical gradient: compare above and below.
                    m > mag_at(x, y - 1) && m >= mag_at(x, y + 1)
                } else {
                    // Diagonal: same-signed components point down-right.
                    let s = if (dx < 0) == (dy < 0) { 1 } else { -1 };
                    m > mag_at(x - s, y - 1) && m > mag_at(x + s, y + 1)
                }
            };

            if is_max {
                out[i] = if mf >= high_threshold {
                    Class::Strong
                } else {
                    Class::Weak
                };
            }
        }
    }
    out
}

/// Filter out edges with the thresholds.
/// Non-recursive depth-first flood from every strong pixel.
fn hysteresis(grid: Grid, classes: &[Class]) -> GrayImage {
    const NEIGHBORS: [(i64, i64); 8] = [
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
        (-1, -1),
        (0, -1),
        (1, -1),
    ];

    let mut out = vec![0u8; classes.len()];
    let mut stack: Vec<(i64, i64)> = Vec::new();
    for y in 0..i64::from(grid.h) {
        for x in 0..i64::from(grid.w) {
            let Some(i) = grid.index(x, y) else {
                continue;
            };
            if classes[i] != Class::Strong || out[i] != 0 {
                continue;
            }
            out[i] = u8::MAX;
            stack.push((x, y));
            // Track neighbours until no weak or strong neighbour remains.
            while let Some((nx, ny)) = stack.pop() {
                for (ox, oy) in NEIGHBORS {
                    let (cx, cy) = (nx + ox, ny + oy);
                    let Some(j) = grid.index(cx, cy) else {
                        continue;
                    };
                    if classes[j] != Class::None && out[j] == 0 {
                        out[j] = u8::MAX;
                        stack.push((cx, cy));
                    }
                }
            }
        }
    }

    GrayImage::from_raw(grid.w, grid.h, out).unwrap_or_else(|| GrayImage::new(grid.w, grid.h))
}
