//! sheetcount-io: Frame sources, pacing and output rendering.
//!
//! Everything that touches files, child processes or wall-clock time
//! lives here so that `sheetcount-pipeline` stays pure.

pub mod error;
pub mod input;
pub mod pacing;
pub mod render;
pub mod report;
pub mod source;

pub use error::DriverError;
pub use input::InputKind;
pub use pacing::Pacer;
pub use render::PreviewSize;
pub use report::{CountedFrame, FrameReport, RunSummary, count_frame};
pub use source::{FfmpegTools, FrameSource, RawFrames, TimedFrame};

use std::time::{Duration, Instant};

use sheetcount_pipeline::Clock;

/// [`Clock`] implementation backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
