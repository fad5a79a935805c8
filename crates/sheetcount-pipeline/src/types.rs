//! Shared types for the sheetcount pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` for drivers that build frames from decoded
/// images or render overlays.
pub use image::RgbImage;

/// Number of interleaved channels a raw input [`Frame`] must carry
/// (blue, green, red).
pub const FRAME_CHANNELS: u8 = 3;

/// Smallest width or height accepted by [`crate::preprocess`].
///
/// Matches the footprint of the 3x3 derivative kernel used by edge
/// detection.
pub const MIN_FRAME_DIMENSION: u32 = 3;

/// Width and height of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A raw input frame: a fixed-size grid of interleaved 8-bit samples.
///
/// Color frames store their channels in blue, green, red order. The
/// buffer length is checked on construction; the shape itself (minimum
/// size, channel count) is validated by [`crate::preprocess`] so that
/// callers can hold any decoded frame and get a typed error at the
/// pipeline boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an interleaved sample buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFrame`] if `data.len()` is not
    /// `width * height * channels`.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        let expected = u64::from(width) * u64::from(height) * u64::from(channels);
        if u64::try_from(data.len()).ok() != Some(expected) {
            return Err(PipelineError::InvalidFrame(format!(
                "buffer holds {} bytes, expected {expected} for {width}x{height}x{channels}",
                data.len(),
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Wrap a packed BGR buffer (3 bytes per pixel).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFrame`] if the buffer length does
    /// not match the dimensions.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PipelineError> {
        Self::from_raw(width, height, FRAME_CHANNELS, data)
    }

    /// Build a BGR frame from an RGB image, swapping the channel order.
    #[must_use]
    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let data = image
            .pixels()
            .flat_map(|p| {
                let [r, g, b] = p.0;
                [b, g, r]
            })
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            channels: FRAME_CHANNELS,
            data,
        }
    }

    /// Build a BGR frame from a grayscale image by replicating the
    /// intensity into all three channels.
    #[must_use]
    pub fn from_luma_image(image: &GrayImage) -> Self {
        let data = image.pixels().flat_map(|p| [p.0[0]; 3]).collect();
        Self {
            width: image.width(),
            height: image.height(),
            channels: FRAME_CHANNELS,
            data,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of interleaved channels per pixel.
    #[must_use]
    pub const fn channels(&self) -> u8 {
        self.channels
    }

    /// Frame dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// The raw interleaved samples, row-major.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Convert back to an RGB image for display.
    ///
    /// Single-channel frames are expanded to gray RGB. Returns `None`
    /// for channel layouts other than 1 or 3.
    #[must_use]
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        let data: Vec<u8> = match self.channels {
            1 => self.data.iter().flat_map(|&v| [v; 3]).collect(),
            3 => self
                .data
                .chunks_exact(3)
                .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
                .collect(),
            _ => return None,
        };
        RgbImage::from_raw(self.width, self.height, data)
    }

    /// Check the shape requirements of the preprocessor.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFrame`] if the channel count is
    /// not [`FRAME_CHANNELS`] or either dimension is below
    /// [`MIN_FRAME_DIMENSION`].
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.channels != FRAME_CHANNELS {
            return Err(PipelineError::InvalidFrame(format!(
                "expected {FRAME_CHANNELS} channels, got {}",
                self.channels,
            )));
        }
        if self.width < MIN_FRAME_DIMENSION || self.height < MIN_FRAME_DIMENSION {
            return Err(PipelineError::InvalidFrame(format!(
                "{}x{} is smaller than the minimum {MIN_FRAME_DIMENSION}x{MIN_FRAME_DIMENSION}",
                self.width, self.height,
            )));
        }
        Ok(())
    }
}

/// A binary edge mask: 0 for background, 255 for edge pixels.
///
/// Always the same size as the [`Frame`] it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMask(GrayImage);

impl EdgeMask {
    /// Foreground value.
    pub const EDGE: u8 = 255;

    /// Build a mask from any single-channel image.
    ///
    /// Every non-zero pixel becomes [`Self::EDGE`], matching how the
    /// contour tracer treats its input.
    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self(GrayImage::from_fn(image.width(), image.height(), |x, y| {
            if image.get_pixel(x, y).0[0] == 0 {
                image::Luma([0])
            } else {
                image::Luma([Self::EDGE])
            }
        }))
    }

    /// Wrap an image that is already strictly 0/255.
    pub(crate) fn from_binary(image: GrayImage) -> Self {
        debug_assert!(image.pixels().all(|p| p.0[0] == 0 || p.0[0] == Self::EDGE));
        Self(image)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// Whether the pixel at `(x, y)` is an edge.
    ///
    /// Out-of-range coordinates are background.
    #[must_use]
    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel_checked(x, y).is_some_and(|p| p.0[0] != 0)
    }

    /// Number of edge pixels.
    #[must_use]
    pub fn edge_pixel_count(&self) -> u64 {
        crate::diagnostics::count_edge_pixels(&self.0)
    }

    /// Borrow the underlying grayscale image.
    #[must_use]
    pub const fn as_image(&self) -> &GrayImage {
        &self.0
    }

    /// Take the underlying grayscale image.
    #[must_use]
    pub fn into_image(self) -> GrayImage {
        self.0
    }
}

/// An integer pixel coordinate on a contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// One outer boundary traced in an [`EdgeMask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour(Vec<Point>);

impl Contour {
    /// Create a contour from an ordered boundary.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of stored points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// The boundary points in traversal order.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consume the contour, returning its points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }
}

/// Number of sheets detected in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetCount(usize);

impl SheetCount {
    /// Wrap a raw count.
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self(count)
    }

    /// The count as a plain integer.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SheetCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<SheetCount> for usize {
    fn from(count: SheetCount) -> Self {
        count.0
    }
}

/// Configuration for the preprocessing pipeline.
///
/// These are the only tunable knobs. Grayscale weights, the
/// structuring element shape and hysteresis linking are fixed.
///
/// # Invariants
///
/// Checked by [`validate`](Self::validate), which [`crate::preprocess`]
/// calls before touching any pixels:
///
/// - `blur_kernel_size` is odd (1 disables smoothing);
/// - both thresholds are finite and non-negative;
/// - `edge_low_threshold <= edge_high_threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gaussian kernel width and height in pixels.
    pub blur_kernel_size: u32,

    /// Gradient magnitude below which a pixel is never an edge.
    pub edge_low_threshold: f32,

    /// Gradient magnitude at or above which a pixel is a strong edge.
    pub edge_high_threshold: f32,

    /// Number of 3x3 dilation passes.
    pub dilate_iterations: u32,

    /// Number of 3x3 erosion passes after dilation.
    pub erode_iterations: u32,
}

impl PipelineConfig {
    /// Default Gaussian kernel size.
    pub const DEFAULT_BLUR_KERNEL_SIZE: u32 = 5;
    /// Default hysteresis low threshold.
    pub const DEFAULT_EDGE_LOW_THRESHOLD: f32 = 50.0;
    /// Default hysteresis high threshold.
    pub const DEFAULT_EDGE_HIGH_THRESHOLD: f32 = 150.0;
    /// Default number of dilation passes.
    pub const DEFAULT_DILATE_ITERATIONS: u32 = 2;
    /// Default number of erosion passes.
    pub const DEFAULT_ERODE_ITERATIONS: u32 = 1;

    /// Check the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// violated invariant.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.blur_kernel_size % 2 == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "blur_kernel_size must be odd, got {}",
                self.blur_kernel_size,
            )));
        }
        for (name, value) in [
            ("edge_low_threshold", self.edge_low_threshold),
            ("edge_high_threshold", self.edge_high_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}",
                )));
            }
        }
        if self.edge_low_threshold > self.edge_high_threshold {
            return Err(PipelineError::InvalidConfig(format!(
                "edge_low_threshold ({}) exceeds edge_high_threshold ({})",
                self.edge_low_threshold, self.edge_high_threshold,
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: Self::DEFAULT_BLUR_KERNEL_SIZE,
            edge_low_threshold: Self::DEFAULT_EDGE_LOW_THRESHOLD,
            edge_high_threshold: Self::DEFAULT_EDGE_HIGH_THRESHOLD,
            dilate_iterations: Self::DEFAULT_DILATE_ITERATIONS,
            erode_iterations: Self::DEFAULT_ERODE_ITERATIONS,
        }
    }
}

/// Edge mask and sheet count for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// The binary edge mask used for counting.
    pub mask: EdgeMask,
    /// Number of outer contours found in `mask`.
    pub count: SheetCount,
}

/// Result of running the pipeline with all intermediate stage outputs
/// preserved.
///
/// Each field captures the output of one logical pipeline stage so a
/// driver can write a preview for every step.
///
/// Uses custom `Serialize`/`Deserialize` implementations because
/// `GrayImage` does not implement serde traits. Raster images are
/// serialized as `(width, height, raw_pixels)` tuples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedResult {
    /// Stage 1: grayscale conversion.
    pub grayscale: GrayImage,
    /// Stage 2: Gaussian-smoothed image.
    pub blurred: GrayImage,
    /// Stage 3: raw Canny edge map.
    pub edges: GrayImage,
    /// Stage 4: edge map after dilation.
    pub dilated: GrayImage,
    /// Stage 5: final mask after erosion.
    pub mask: EdgeMask,
    /// Outer contours traced in `mask`.
    pub contours: Vec<Contour>,
    /// Number of contours.
    pub count: SheetCount,
    /// Source frame dimensions in pixels.
    pub dimensions: Dimensions,
}

impl StagedResult {
    /// Drop the intermediates, keeping the mask and count.
    #[must_use]
    pub fn into_result(self) -> ProcessResult {
        ProcessResult {
            mask: self.mask,
            count: self.count,
        }
    }
}

/// Serde-compatible proxy for `StagedResult`.
#[derive(Serialize, Deserialize)]
struct StagedResultProxy {
    grayscale: (u32, u32, Vec<u8>),
    blurred: (u32, u32, Vec<u8>),
    edges: (u32, u32, Vec<u8>),
    dilated: (u32, u32, Vec<u8>),
    mask: (u32, u32, Vec<u8>),
    contours: Vec<Contour>,
    count: SheetCount,
    dimensions: Dimensions,
}

fn raster_parts(image: &GrayImage) -> (u32, u32, Vec<u8>) {
    (image.width(), image.height(), image.as_raw().clone())
}

fn raster_from_parts<E: serde::de::Error>(
    (width, height, raw): (u32, u32, Vec<u8>),
    what: &str,
) -> Result<GrayImage, E> {
    GrayImage::from_raw(width, height, raw)
        .ok_or_else(|| E::custom(format!("invalid {what} image dimensions")))
}

impl Serialize for StagedResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = StagedResultProxy {
            grayscale: raster_parts(&self.grayscale),
            blurred: raster_parts(&self.blurred),
            edges: raster_parts(&self.edges),
            dilated: raster_parts(&self.dilated),
            mask: raster_parts(self.mask.as_image()),
            contours: self.contours.clone(),
            count: self.count,
            dimensions: self.dimensions,
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StagedResult {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = StagedResultProxy::deserialize(deserializer)?;
        Ok(Self {
            grayscale: raster_from_parts(proxy.grayscale, "grayscale")?,
            blurred: raster_from_parts(proxy.blurred, "blurred")?,
            edges: raster_from_parts(proxy.edges, "edges")?,
            dilated: raster_from_parts(proxy.dilated, "dilated")?,
            mask: EdgeMask::from_image(&raster_from_parts(proxy.mask, "mask")?),
            contours: proxy.contours,
            count: proxy.count,
            dimensions: proxy.dimensions,
        })
    }
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// The frame is empty, too small, has the wrong channel count, or
    /// its buffer does not match its dimensions.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Frame tests ---

    #[test]
    fn from_raw_rejects_length_mismatch() {
        let result = Frame::from_raw(4, 4, 3, vec![0; 47]);
        assert!(matches!(result, Err(PipelineError::InvalidFrame(_))));
    }

    #[test]
    fn from_raw_accepts_empty_frame() {
        // Zero-sized frames are representable; preprocess rejects them.
        let frame = Frame::from_raw(0, 0, 3, vec![]).unwrap();
        assert!(matches!(
            frame.validate(),
            Err(PipelineError::InvalidFrame(_))
        ));
    }

    #[test]
    fn validate_rejects_wrong_channel_count() {
        let frame = Frame::from_raw(8, 8, 4, vec![0; 8 * 8 * 4]).unwrap();
        let err = frame.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid frame: expected 3 channels, got 4");
    }

    #[test]
    fn validate_rejects_tiny_frames() {
        for (w, h) in [(1, 1), (2, 10), (10, 2)] {
            let frame = Frame::from_bgr(w, h, vec![0; (w * h * 3) as usize]).unwrap();
            assert!(frame.validate().is_err(), "{w}x{h} should be rejected");
        }
        let frame = Frame::from_bgr(3, 3, vec![0; 27]).unwrap();
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn from_rgb_image_swaps_to_bgr() {
        let img = RgbImage::from_pixel(1, 1, image::Rgb([10, 20, 30]));
        let frame = Frame::from_rgb_image(&img);
        assert_eq!(frame.as_bytes(), &[30, 20, 10]);
        assert_eq!(frame.to_rgb_image().unwrap(), img);
    }

    #[test]
    fn from_luma_image_replicates_channels() {
        let img = GrayImage::from_pixel(2, 1, image::Luma([77]));
        let frame = Frame::from_luma_image(&img);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.as_bytes(), &[77; 6]);
    }

    // --- EdgeMask tests ---

    #[test]
    fn edge_mask_from_image_binarizes() {
        let mut img = GrayImage::new(3, 1);
        img.put_pixel(1, 0, image::Luma([7]));
        img.put_pixel(2, 0, image::Luma([255]));
        let mask = EdgeMask::from_image(&img);
        assert_eq!(mask.as_image().as_raw(), &vec![0, 255, 255]);
        assert_eq!(mask.edge_pixel_count(), 2);
        assert!(mask.is_edge(1, 0));
        assert!(!mask.is_edge(0, 0));
        assert!(!mask.is_edge(5, 5));
    }

    // --- SheetCount tests ---

    #[test]
    fn sheet_count_serializes_as_plain_integer() {
        let json = serde_json::to_string(&SheetCount::new(5)).unwrap();
        assert_eq!(json, "5");
        assert_eq!(SheetCount::new(5).to_string(), "5");
    }

    // --- PipelineConfig tests ---

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.blur_kernel_size, 5);
        assert!((config.edge_low_threshold - 50.0).abs() < f32::EPSILON);
        assert!((config.edge_high_threshold - 150.0).abs() < f32::EPSILON);
        assert_eq!(config.dilate_iterations, 2);
        assert_eq!(config.erode_iterations, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_even_kernel() {
        let config = PipelineConfig {
            blur_kernel_size: 4,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_low_above_high() {
        let config = PipelineConfig {
            edge_low_threshold: 200.0,
            edge_high_threshold: 100.0,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid pipeline configuration: edge_low_threshold (200) exceeds edge_high_threshold (100)",
        );
    }

    #[test]
    fn validate_rejects_nan_threshold() {
        let config = PipelineConfig {
            edge_high_threshold: f32::NAN,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_config_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"dilate_iterations": 3}"#).unwrap();
        assert_eq!(config.dilate_iterations, 3);
        assert_eq!(config.blur_kernel_size, 5);
    }

    #[test]
    fn pipeline_config_serde_round_trip() {
        let config = PipelineConfig {
            blur_kernel_size: 7,
            edge_low_threshold: 30.0,
            edge_high_threshold: 120.0,
            dilate_iterations: 1,
            erode_iterations: 0,
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    // --- StagedResult / PipelineError serde ---

    #[test]
    fn staged_result_serde_round_trip() {
        let mut mask = GrayImage::new(2, 2);
        mask.put_pixel(0, 0, image::Luma([255]));
        let staged = StagedResult {
            grayscale: GrayImage::from_pixel(2, 2, image::Luma([50])),
            blurred: GrayImage::from_pixel(2, 2, image::Luma([45])),
            edges: GrayImage::from_pixel(2, 2, image::Luma([0])),
            dilated: GrayImage::from_pixel(2, 2, image::Luma([255])),
            mask: EdgeMask::from_image(&mask),
            contours: vec![Contour::new(vec![Point::new(0, 0)])],
            count: SheetCount::new(1),
            dimensions: Dimensions {
                width: 2,
                height: 2,
            },
        };

        let json = serde_json::to_string(&staged).unwrap();
        let deserialized: StagedResult = serde_json::from_str(&json).unwrap();
        assert_eq!(staged, deserialized);
    }

    #[test]
    fn pipeline_error_serde_round_trip() {
        let err = PipelineError::InvalidFrame("0x0".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }
}
