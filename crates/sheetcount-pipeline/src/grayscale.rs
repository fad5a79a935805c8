//! BGR to grayscale conversion.
//!
//! This is the first step in the pipeline: a validated 3-channel
//! [`Frame`] in, a single-channel `GrayImage` out.

use image::GrayImage;

use crate::types::{FRAME_CHANNELS, Frame, PipelineError};

/// Fixed-point precision of the luma weights.
const SHIFT: u32 = 14;

/// Luma weights scaled by `2^SHIFT`: 0.114 (B), 0.587 (G), 0.299 (R).
///
/// The three weights sum to exactly `2^SHIFT`, so a uniform input maps
/// to the same intensity.
const WEIGHT_B: u32 = 1868;
const WEIGHT_G: u32 = 9617;
const WEIGHT_R: u32 = 4899;
const _: () = assert!(WEIGHT_B + WEIGHT_G + WEIGHT_R == 1 << SHIFT);

/// Rounding bias for the final shift.
const HALF: u32 = 1 << (SHIFT - 1);

/// Convert one BGR sample triple to luma, rounded to nearest.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn luma(b: u8, g: u8, r: u8) -> u8 {
    let weighted = b as u32 * WEIGHT_B + g as u32 * WEIGHT_G + r as u32 * WEIGHT_R;
    // Weights sum to 2^SHIFT, so the result never exceeds 255.
    ((weighted + HALF) >> SHIFT) as u8
}

/// Convert a 3-channel BGR frame to grayscale.
///
/// Only the channel count is checked here; size limits are enforced by
/// [`Frame::validate`] at the pipeline boundary.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidFrame`] if the frame does not have
/// [`FRAME_CHANNELS`] channels.
pub fn to_grayscale(frame: &Frame) -> Result<GrayImage, PipelineError> {
    if frame.channels() != FRAME_CHANNELS {
        return Err(PipelineError::InvalidFrame(format!(
            "expected {FRAME_CHANNELS} channels, got {}",
            frame.channels(),
        )));
    }
    let data = frame
        .as_bytes()
        .chunks_exact(3)
        .map(|bgr| luma(bgr[0], bgr[1], bgr[2]))
        .collect();
    GrayImage::from_raw(frame.width(), frame.height(), data).ok_or_else(|| {
        PipelineError::InvalidFrame("sample buffer does not match dimensions".to_string())
    })
}
