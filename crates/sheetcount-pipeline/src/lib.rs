//! sheetcount-pipeline: Pure sheet counting pipeline (sans-IO).
//!
//! Turns one BGR frame of a paper stack's edge into a binary edge mask
//! and counts the sheets in it through:
//! grayscale -> blur -> edge detection -> dilate -> erode -> outer
//! contour tracing.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! frames and returns structured data. Decoding, video capture, and
//! file output live in `sheetcount-io`.

pub mod blur;
pub mod canny;
pub mod contour;
pub mod diagnostics;
pub mod edge;
pub mod grayscale;
pub mod morphology;
pub mod types;

pub use contour::{count_contours, find_external_contours};
pub use diagnostics::{Clock, NullClock, PipelineDiagnostics, process_staged_with_diagnostics};
pub use types::{
    Contour, Dimensions, EdgeMask, Frame, PipelineConfig, PipelineError, Point, ProcessResult,
    SheetCount, StagedResult,
};

/// Turn a frame into a binary edge mask.
///
/// # Pipeline steps
///
/// 1. BGR to grayscale
/// 2. Gaussian smoothing (`blur_kernel_size`, 5x5 by default)
/// 3. Canny edge detection (`edge_low_threshold`, `edge_high_threshold`)
/// 4. Dilation (`dilate_iterations` passes of a 3x3 box)
/// 5. Erosion (`erode_iterations` passes of a 3x3 box)
///
/// The mask has the same width and height as `frame`. Identical input
/// always produces an identical mask.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// validation, or [`PipelineError::InvalidFrame`] if `frame` is not a
/// 3-channel image of at least
/// [`MIN_FRAME_DIMENSION`](types::MIN_FRAME_DIMENSION) pixels per side.
pub fn preprocess(frame: &Frame, config: &PipelineConfig) -> Result<EdgeMask, PipelineError> {
    let mask = diagnostics::run_stages(frame, config, &NullClock)?.mask;

    tracing::debug!(
        width = mask.width(),
        height = mask.height(),
        edge_pixels = mask.edge_pixel_count(),
        "preprocessed frame"
    );

    Ok(mask)
}

/// Preprocess a frame and count the sheets in it.
///
/// # Errors
///
/// Same as [`preprocess`].
pub fn process(frame: &Frame, config: &PipelineConfig) -> Result<ProcessResult, PipelineError> {
    let mask = preprocess(frame, config)?;
    let count = count_contours(&mask);
    tracing::debug!(sheets = count.get(), "counted contours");
    Ok(ProcessResult { mask, count })
}

/// Run the pipeline and keep every intermediate stage output.
///
/// The final mask and count are identical to what [`process`] returns.
///
/// # Errors
///
/// Same as [`preprocess`].
pub fn process_staged(frame: &Frame, config: &PipelineConfig) -> Result<StagedResult, PipelineError> {
    process_staged_with_diagnostics(frame, config, &NullClock).map(|(staged, _)| staged)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    /// 400x400 frame with five bright horizontal strips on black,
    /// 40 pixels tall and 30 apart.
    fn five_strip_frame() -> Frame {
        let img = GrayImage::from_fn(400, 400, |x, y| {
            let in_strip = (50..350).contains(&x)
                && (0..5).any(|i| {
                    let top = 40 + i * 70;
                    (top..top + 40).contains(&y)
                });
            Luma([if in_strip { 255 } else { 0 }])
        });
        Frame::from_luma_image(&img)
    }

    #[test]
    fn five_strips_count_five() {
        let result = process(&five_strip_frame(), &PipelineConfig::default()).unwrap();
        assert_eq!(result.count, SheetCount::new(5));
    }

    #[test]
    fn mask_matches_frame_dimensions() {
        let frame = Frame::from_bgr(7, 5, vec![90; 7 * 5 * 3]).unwrap();
        let mask = preprocess(&frame, &PipelineConfig::default()).unwrap();
        assert_eq!(mask.width(), 7);
        assert_eq!(mask.height(), 5);
    }

    #[test]
    fn mask_is_binary() {
        let mask = preprocess(&five_strip_frame(), &PipelineConfig::default()).unwrap();
        assert!(
            mask.as_image()
                .pixels()
                .all(|p| p.0[0] == 0 || p.0[0] == EdgeMask::EDGE)
        );
    }

    #[test]
    fn uniform_frame_counts_zero() {
        let frame = Frame::from_bgr(64, 48, vec![128; 64 * 48 * 3]).unwrap();
        let result = process(&frame, &PipelineConfig::default()).unwrap();
        assert_eq!(result.mask.edge_pixel_count(), 0);
        assert_eq!(result.count.get(), 0);
    }

    #[test]
    fn preprocess_is_deterministic() {
        let frame = five_strip_frame();
        let config = PipelineConfig::default();
        assert_eq!(
            preprocess(&frame, &config).unwrap(),
            preprocess(&frame, &config).unwrap(),
        );
    }

    #[test]
    fn tiny_frames_are_rejected() {
        let one = Frame::from_bgr(1, 1, vec![0, 0, 0]).unwrap();
        assert!(matches!(
            preprocess(&one, &PipelineConfig::default()),
            Err(PipelineError::InvalidFrame(_)),
        ));
        let empty = Frame::from_bgr(0, 0, Vec::new()).unwrap();
        assert!(matches!(
            process(&empty, &PipelineConfig::default()),
            Err(PipelineError::InvalidFrame(_)),
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig {
            blur_kernel_size: 4,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            preprocess(&five_strip_frame(), &config),
            Err(PipelineError::InvalidConfig(_)),
        ));
    }

    #[test]
    fn staged_result_agrees_with_process() {
        let frame = five_strip_frame();
        let config = PipelineConfig::default();
        let staged = process_staged(&frame, &config).unwrap();
        assert_eq!(staged.dimensions, frame.dimensions());
        assert_eq!(staged.contours.len(), staged.count.get());
        assert_eq!(staged.into_result(), process(&frame, &config).unwrap());
    }

    #[test]
    fn staged_mask_equals_preprocess_for_every_config() {
        let frame = five_strip_frame();
        for config in [
            PipelineConfig::default(),
            PipelineConfig {
                blur_kernel_size: 3,
                dilate_iterations: 1,
                erode_iterations: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                blur_kernel_size: 9,
                edge_low_threshold: 20.0,
                edge_high_threshold: 60.0,
                ..PipelineConfig::default()
            },
        ] {
            let staged = process_staged(&frame, &config).unwrap();
            assert_eq!(staged.mask, preprocess(&frame, &config).unwrap());
        }
    }

    #[test]
    fn no_erosion_still_counts_strips() {
        let config = PipelineConfig {
            erode_iterations: 0,
            ..PipelineConfig::default()
        };
        let result = process(&five_strip_frame(), &config).unwrap();
        assert_eq!(result.count.get(), 5);
    }
}
