//! Morphological cleanup of the edge map.
//!
//! Dilation closes small gaps between edge fragments of the same sheet
//! boundary; a smaller number of erosion passes then trims stray pixels
//! while keeping the now-connected contours. Both use a 3x3 box
//! structuring element (chessboard distance 1). Pixels outside the image
//! never add foreground during dilation and never remove it during
//! erosion.

use image::GrayImage;
use imageproc::distance_transform::Norm;

/// Structuring element radius per pass under [`Norm::LInf`]: a 3x3 box.
const ELEMENT_RADIUS: u8 = 1;

/// Grow foreground regions by `iterations` passes of a 3x3 box.
///
/// Zero iterations return the image unchanged.
#[must_use = "returns the dilated image"]
pub fn dilate(image: &GrayImage, iterations: u32) -> GrayImage {
    repeat(image, iterations, |img| {
        imageproc::morphology::dilate(img, Norm::LInf, ELEMENT_RADIUS)
    })
}

/// Shrink foreground regions by `iterations` passes of a 3x3 box.
///
/// Zero iterations return the image unchanged.
#[must_use = "returns the eroded image"]
pub fn erode(image: &GrayImage, iterations: u32) -> GrayImage {
    repeat(image, iterations, |img| {
        imageproc::morphology::erode(img, Norm::LInf, ELEMENT_RADIUS)
    })
}

fn repeat(image: &GrayImage, iterations: u32, pass: impl Fn(&GrayImage) -> GrayImage) -> GrayImage {
    (0..iterations).fold(image.clone(), |img, _| pass(&img))
}
