//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! parameter tuning and for reporting per-frame processing time.
//!
//! Timestamps come from a caller-supplied [`Clock`] so this crate stays
//! free of platform time sources. Durations are serialized as
//! fractional seconds (`f64`) for JSON compatibility, since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Contour, EdgeMask, Frame, PipelineConfig, PipelineError, StagedResult};

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A [`Clock`] that never advances. Every duration is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClock;

impl Clock for NullClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: grayscale conversion.
    pub grayscale: StageDiagnostics,
    /// Stage 2: Gaussian smoothing.
    pub blur: StageDiagnostics,
    /// Stage 3: Canny edge detection.
    pub edge_detection: StageDiagnostics,
    /// Stage 4: dilation.
    pub dilate: StageDiagnostics,
    /// Stage 5: erosion.
    pub erode: StageDiagnostics,
    /// Contour tracing and counting.
    pub contour_tracing: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Grayscale conversion metrics.
    Grayscale {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },
    /// Gaussian smoothing metrics.
    Blur {
        /// Kernel width and height.
        kernel_size: u32,
    },
    /// Canny edge detection metrics.
    EdgeDetection {
        /// Low threshold (after clamping).
        low_threshold: f32,
        /// High threshold (after clamping).
        high_threshold: f32,
        /// Number of edge pixels in the output.
        edge_pixel_count: u64,
        /// Total pixel count for computing edge density.
        total_pixel_count: u64,
    },
    /// Dilation or erosion metrics.
    Morphology {
        /// Number of passes applied.
        iterations: u32,
        /// Foreground pixels after the stage.
        edge_pixel_count: u64,
    },
    /// Contour tracing metrics.
    ContourTracing {
        /// Number of outer contours found.
        contour_count: usize,
        /// Total number of stored points across all contours.
        total_point_count: usize,
        /// Minimum points in any single contour.
        min_contour_points: usize,
        /// Maximum points in any single contour.
        max_contour_points: usize,
        /// Mean points per contour.
        mean_contour_points: f64,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source frame width in pixels.
    pub image_width: u32,
    /// Source frame height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Edge pixels in the final mask.
    pub mask_edge_pixels: u64,
    /// Number of sheets counted.
    pub sheet_count: usize,
}

/// Outputs and timings of the five preprocessing stages.
pub(crate) struct Preprocessed {
    pub(crate) grayscale: image::GrayImage,
    pub(crate) blurred: image::GrayImage,
    pub(crate) edges: image::GrayImage,
    pub(crate) dilated: image::GrayImage,
    pub(crate) mask: EdgeMask,
    pub(crate) grayscale_diag: StageDiagnostics,
    pub(crate) blur_diag: StageDiagnostics,
    pub(crate) edge_diag: StageDiagnostics,
    pub(crate) dilate_diag: StageDiagnostics,
    pub(crate) erode_diag: StageDiagnostics,
}

/// Validate the inputs and run grayscale, blur, edge detection, dilation
/// and erosion in order, timing each stage with `clock`.
///
/// Both [`crate::preprocess`] and [`process_staged_with_diagnostics`]
/// go through here, so they always produce the same mask.
pub(crate) fn run_stages<C: Clock>(
    frame: &Frame,
    config: &PipelineConfig,
    clock: &C,
) -> Result<Preprocessed, PipelineError> {
    config.validate()?;
    frame.validate()?;

    let dimensions = frame.dimensions();

    // 1. Grayscale.
    let start = clock.now();
    let grayscale = crate::grayscale::to_grayscale(frame)?;
    let grayscale_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Grayscale {
            width: dimensions.width,
            height: dimensions.height,
        },
    };

    // 2. Gaussian smoothing.
    let start = clock.now();
    let blurred = crate::blur::gaussian_blur(&grayscale, config.blur_kernel_size);
    let blur_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Blur {
            kernel_size: config.blur_kernel_size,
        },
    };

    // 3. Edge detection.
    let start = clock.now();
    let edges = crate::edge::detect_edges(
        &blurred,
        config.edge_low_threshold,
        config.edge_high_threshold,
    );
    let (low_threshold, high_threshold) =
        crate::edge::effective_thresholds(config.edge_low_threshold, config.edge_high_threshold);
    let edge_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::EdgeDetection {
            low_threshold,
            high_threshold,
            edge_pixel_count: count_edge_pixels(&edges),
            total_pixel_count: dimensions.pixel_count(),
        },
    };

    // 4. Dilation.
    let start = clock.now();
    let dilated = crate::morphology::dilate(&edges, config.dilate_iterations);
    let dilate_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Morphology {
            iterations: config.dilate_iterations,
            edge_pixel_count: count_edge_pixels(&dilated),
        },
    };

    // 5. Erosion.
    let start = clock.now();
    let mask = EdgeMask::from_binary(crate::morphology::erode(&dilated, config.erode_iterations));
    let erode_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Morphology {
            iterations: config.erode_iterations,
            edge_pixel_count: mask.edge_pixel_count(),
        },
    };

    Ok(Preprocessed {
        grayscale,
        blurred,
        edges,
        dilated,
        mask,
        grayscale_diag,
        blur_diag,
        edge_diag,
        dilate_diag,
        erode_diag,
    })
}

/// Run the pipeline, keeping every intermediate and timing each stage.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// validation, or [`PipelineError::InvalidFrame`] if `frame` is
/// malformed.
pub fn process_staged_with_diagnostics<C: Clock>(
    frame: &Frame,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let pipeline_start = clock.now();
    let Preprocessed {
        grayscale,
        blurred,
        edges,
        dilated,
        mask,
        grayscale_diag,
        blur_diag,
        edge_diag,
        dilate_diag,
        erode_diag,
    } = run_stages(frame, config, clock)?;
    let dimensions = frame.dimensions();

    // Contours and count.
    let start = clock.now();
    let contours = crate::contour::find_external_contours(&mask);
    let count = crate::types::SheetCount::new(contours.len());
    let stats = contour_stats(&contours);
    let contour_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::ContourTracing {
            contour_count: contours.len(),
            total_point_count: stats.total,
            min_contour_points: stats.min,
            max_contour_points: stats.max,
            mean_contour_points: stats.mean,
        },
    };

    let total_duration = clock.elapsed(&pipeline_start);

    let diagnostics = PipelineDiagnostics {
        grayscale: grayscale_diag,
        blur: blur_diag,
        edge_detection: edge_diag,
        dilate: dilate_diag,
        erode: erode_diag,
        contour_tracing: contour_diag,
        total_duration,
        summary: PipelineSummary {
            image_width: dimensions.width,
            image_height: dimensions.height,
            pixel_count: dimensions.pixel_count(),
            mask_edge_pixels: mask.edge_pixel_count(),
            sheet_count: count.get(),
        },
    };

    tracing::debug!(
        width = dimensions.width,
        height = dimensions.height,
        sheets = count.get(),
        total_ms = duration_ms(total_duration),
        "pipeline finished"
    );

    let staged = StagedResult {
        grayscale,
        blurred,
        edges,
        dilated,
        mask,
        contours,
        count,
        dimensions,
    };

    Ok((staged, diagnostics))
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let stages: [(&str, &StageDiagnostics); 6] = [
            ("Grayscale", &self.grayscale),
            ("Blur", &self.blur),
            ("Edge Detection", &self.edge_detection),
            ("Dilate", &self.dilate),
            ("Erode", &self.erode),
            ("Contour Tracing", &self.contour_tracing),
        ];

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Mask edge pixels: {}  |  Sheets: {}",
            self.summary.mask_edge_pixels, self.summary.sheet_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Grayscale { width, height } => format!("{width}x{height}"),
        StageMetrics::Blur { kernel_size } => format!("kernel={kernel_size}x{kernel_size}"),
        StageMetrics::EdgeDetection {
            low_threshold,
            high_threshold,
            edge_pixel_count,
            total_pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixel_count > 0 {
                *edge_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "low={low_threshold:.1} high={high_threshold:.1} edges={edge_pixel_count} ({density:.1}%)",
            )
        }
        StageMetrics::Morphology {
            iterations,
            edge_pixel_count,
        } => format!("iterations={iterations} edges={edge_pixel_count}"),
        StageMetrics::ContourTracing {
            contour_count,
            total_point_count,
            min_contour_points,
            max_contour_points,
            mean_contour_points,
        } => {
            format!(
                "{contour_count} contours, {total_point_count} pts (min={min_contour_points} max={max_contour_points} mean={mean_contour_points:.1})",
            )
        }
    }
}

/// Count edge pixels (non-zero) in a grayscale image.
pub(crate) fn count_edge_pixels(image: &image::GrayImage) -> u64 {
    image
        .pixels()
        .map(|p| u64::from(u8::from(p.0[0] != 0)))
        .sum()
}

/// Statistics for a set of contours.
pub(crate) struct ContourStats {
    /// Total number of points across all contours.
    pub total: usize,
    /// Minimum number of points in any single contour.
    pub min: usize,
    /// Maximum number of points in any single contour.
    pub max: usize,
    /// Mean number of points per contour.
    pub mean: f64,
}

/// Compute contour statistics.
pub(crate) fn contour_stats(contours: &[Contour]) -> ContourStats {
    let total: usize = contours.iter().map(Contour::len).sum();
    let min = contours.iter().map(Contour::len).min().unwrap_or(0);
    let max = contours.iter().map(Contour::len).max().unwrap_or(0);
    #[allow(clippy::cast_precision_loss)]
    let mean = if contours.is_empty() {
        0.0
    } else {
        total as f64 / contours.len() as f64
    };
    ContourStats {
        total,
        min,
        max,
        mean,
    }
}
