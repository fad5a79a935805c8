//! Per-frame count reports printed by the driver.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sheetcount_pipeline::{Clock, Frame, PipelineConfig, PipelineDiagnostics, StagedResult};

use crate::error::DriverError;
use crate::source::TimedFrame;

/// Outcome of counting one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    /// Zero-based frame index.
    pub frame: usize,
    /// Sheets counted.
    pub sheets: usize,
    /// Edge pixels in the final mask.
    pub edge_pixels: u64,
    /// Time spent in the pipeline, in seconds.
    pub processing_seconds: f64,
}

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {}: {} sheets ({:.2} s)",
            self.frame, self.sheets, self.processing_seconds
        )
    }
}

/// Everything produced for one frame.
#[derive(Debug, Clone)]
pub struct CountedFrame {
    /// The source frame.
    pub frame: Frame,
    /// All pipeline intermediates.
    pub staged: StagedResult,
    /// Per-stage timings and metrics.
    pub diagnostics: PipelineDiagnostics,
    /// Summary line for output.
    pub report: FrameReport,
}

/// Run the pipeline on one decoded frame, timing it with `clock`.
///
/// # Errors
///
/// Returns [`DriverError::Pipeline`] if the pipeline rejects the frame
/// or the configuration.
pub fn count_frame<C: Clock>(
    timed: TimedFrame,
    config: &PipelineConfig,
    clock: &C,
) -> Result<CountedFrame, DriverError> {
    let (staged, diagnostics) =
        sheetcount_pipeline::process_staged_with_diagnostics(&timed.frame, config, clock)?;
    let report = FrameReport {
        frame: timed.index,
        sheets: staged.count.get(),
        edge_pixels: diagnostics.summary.mask_edge_pixels,
        processing_seconds: diagnostics.total_duration.as_secs_f64(),
    };
    tracing::info!(
        frame = report.frame,
        sheets = report.sheets,
        ms = diagnostics.total_duration.as_secs_f64() * 1000.0,
        "counted frame"
    );
    Ok(CountedFrame {
        frame: timed.frame,
        staged,
        diagnostics,
        report,
    })
}

/// Aggregate over every frame counted in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Frames counted successfully.
    pub frames: usize,
    /// Frames skipped because of errors.
    pub skipped: usize,
    /// Smallest count seen.
    pub min_sheets: Option<usize>,
    /// Largest count seen.
    pub max_sheets: Option<usize>,
    /// Sum of pipeline times, in seconds.
    pub total_processing_seconds: f64,
}

impl RunSummary {
    /// Record a counted frame.
    pub fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        self.min_sheets = Some(self.min_sheets.map_or(report.sheets, |m| m.min(report.sheets)));
        self.max_sheets = Some(self.max_sheets.map_or(report.sheets, |m| m.max(report.sheets)));
        self.total_processing_seconds += report.processing_seconds;
    }

    /// Record a skipped frame.
    pub const fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Mean pipeline time per counted frame.
    #[must_use]
    pub fn mean_processing_time(&self) -> Duration {
        if self.frames == 0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = self.total_processing_seconds / self.frames as f64;
        Duration::try_from_secs_f64(mean).unwrap_or_default()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} frames counted", self.frames)?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        if let (Some(min), Some(max)) = (self.min_sheets, self.max_sheets) {
            write!(f, ", sheets {min}..={max}")?;
        }
        write!(
            f,
            ", mean {:.3} s/frame",
            self.mean_processing_time().as_secs_f64()
        )
    }
}
