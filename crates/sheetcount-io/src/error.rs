//! Driver error type.

use sheetcount_pipeline::PipelineError;

/// Errors raised while reading inputs, decoding frames, or writing
/// outputs.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The input is neither a supported still image nor a supported
    /// video container.
    #[error("unsupported input format: {0}")]
    UnsupportedInputFormat(String),

    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The `image` crate failed to decode or encode an image.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// A video stream could not be probed or decoded.
    #[error("video decode failed: {0}")]
    VideoDecode(String),

    /// The pipeline rejected a frame or configuration.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl DriverError {
    /// Whether the error concerns a single frame and the remaining
    /// frames of a sequence can still be processed.
    #[must_use]
    pub const fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Self::Pipeline(PipelineError::InvalidFrame(_)) | Self::Image(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_display_transparently() {
        let err = DriverError::from(PipelineError::InvalidFrame("1x1 is too small".to_owned()));
        assert_eq!(err.to_string(), "invalid frame: 1x1 is too small");
    }

    #[test]
    fn frame_local_classification() {
        assert!(DriverError::from(PipelineError::InvalidFrame(String::new())).is_frame_local());
        assert!(!DriverError::from(PipelineError::InvalidConfig(String::new())).is_frame_local());
        assert!(!DriverError::VideoDecode("ffmpeg exited".to_owned()).is_frame_local());
    }
}
