//! Gaussian smoothing for noise reduction before edge detection.
//!
//! The kernel is chosen from its size alone: sizes 1, 3, 5 and 7 use
//! fixed tables, larger sizes sample a Gaussian whose sigma is
//! derived from the size. Weights are quantised to integers summing to
//! [`KERNEL_SCALE`], then normalised and handed to
//! [`imageproc::filter::separable_filter_equal`].
//!
//! Border pixels are replicated (imageproc clamps out-of-range samples):
//! a sample at `x = -2` reads `x = 0`.

use image::GrayImage;

/// Sum of the integer weights of every 1D kernel.
pub const KERNEL_SCALE: u32 = 256;

/// Fixed kernels for the small sizes, scaled to [`KERNEL_SCALE`].
const KERNEL_1: [u32; 1] = [256];
const KERNEL_3: [u32; 3] = [64, 128, 64];
const KERNEL_5: [u32; 5] = [16, 64, 96, 64, 16];
const KERNEL_7: [u32; 7] = [8, 28, 56, 72, 56, 28, 8];

/// Standard deviation implied by a kernel size.
///
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`, which gives 1.1 for a 5-tap
/// kernel.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sigma_for_kernel_size(size: u32) -> f64 {
    0.3f64.mul_add((f64::from(size) - 1.0).mul_add(0.5, -1.0), 0.8)
}

/// Integer 1D kernel weights for an odd `size`.
///
/// The weights are symmetric and always sum to [`KERNEL_SCALE`].
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn kernel_weights(size: u32) -> Vec<u32> {
    match size {
        1 => KERNEL_1.to_vec(),
        3 => KERNEL_3.to_vec(),
        5 => KERNEL_5.to_vec(),
        7 => KERNEL_7.to_vec(),
        _ => {
            let sigma = sigma_for_kernel_size(size);
            let center = i64::from(size / 2);
            let raw: Vec<f64> = (0..i64::from(size))
                .map(|i| {
                    let d = (i - center) as f64;
                    (-(d * d) / (2.0 * sigma * sigma)).exp()
                })
                .collect();
            let total: f64 = raw.iter().sum();
            let mut weights: Vec<i64> = raw
                .iter()
                .map(|w| (w / total * f64::from(KERNEL_SCALE)).round() as i64)
                .collect();
            // Push the rounding residue into the center tap.
            let residue = i64::from(KERNEL_SCALE) - weights.iter().sum::<i64>();
            if let Some(mid) = weights.get_mut(center as usize) {
                *mid += residue;
            }
            weights.into_iter().map(|w| w.max(0) as u32).collect()
        }
    }
}

/// Apply a `kernel_size` x `kernel_size` Gaussian blur.
///
/// `kernel_size` must be odd (see
/// [`PipelineConfig::validate`](crate::PipelineConfig::validate)); a
/// size of 1 returns the image unchanged.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, kernel_size: u32) -> GrayImage {
    if kernel_size <= 1 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    imageproc::filter::separable_filter_equal(image, &normalized_kernel(kernel_size))
}

/// [`kernel_weights`] scaled to sum to 1.
#[allow(clippy::cast_precision_loss)]
fn normalized_kernel(size: u32) -> Vec<f32> {
    let scale = KERNEL_SCALE as f32;
    kernel_weights(size)
        .into_iter()
        .map(|w| w as f32 / scale)
        .collect()
}
