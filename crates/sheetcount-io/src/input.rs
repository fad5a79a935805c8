//! Input format detection.
//!
//! Image formats are recognized by their magic bytes, falling back to
//! the file extension. Video containers are recognized by extension
//! only, since their decoding is delegated to `ffmpeg`.

use std::path::Path;

use image::{ImageFormat, ImageReader};

use crate::error::DriverError;

/// Container extensions handed to `ffmpeg`.
pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "m4v", "mov", "avi", "mkv", "webm"];

/// What kind of frame source an input path holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A single still image decoded in-process.
    Still(ImageFormat),
    /// A (possibly animated) GIF decoded in-process.
    Gif,
    /// A video container decoded by `ffmpeg`.
    Video,
}

impl InputKind {
    /// Classify the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] if the file cannot be opened, or
    /// [`DriverError::UnsupportedInputFormat`] if it is neither a
    /// supported image nor a known video container.
    pub fn detect(path: &Path) -> Result<Self, DriverError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let kind = match reader.format() {
            Some(ImageFormat::Gif) => Self::Gif,
            Some(format) if is_still_format(format) => Self::Still(format),
            _ if has_video_extension(path) => Self::Video,
            Some(format) => {
                return Err(DriverError::UnsupportedInputFormat(format!(
                    "{} ({format:?} images are not supported)",
                    path.display(),
                )));
            }
            None => {
                return Err(DriverError::UnsupportedInputFormat(
                    path.display().to_string(),
                ));
            }
        };
        tracing::debug!(path = %path.display(), ?kind, "detected input");
        Ok(kind)
    }

    /// Whether the input can yield more than one frame.
    #[must_use]
    pub const fn is_sequence(self) -> bool {
        !matches!(self, Self::Still(_))
    }
}

/// Image formats enabled in this build.
const fn is_still_format(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Bmp | ImageFormat::WebP
    )
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
