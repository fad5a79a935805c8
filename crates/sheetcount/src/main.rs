//! sheetcount: count the sheets in a paper stack from a photo or video
//! of its edge.
//!
//! Each frame is reduced to a binary edge mask (grayscale, Gaussian
//! smoothing, Canny, dilate, erode) and the outermost contours in the
//! mask are counted, one per sheet.
//!
//! # Usage
//!
//! ```text
//! sheetcount [OPTIONS] <INPUT>
//! ```
//!
//! Counts go to stdout, one line per frame. Logs go to stderr and are
//! filtered with `RUST_LOG` (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use image::DynamicImage;
use serde::Serialize;
use sheetcount_io::render::{self, PreviewSize};
use sheetcount_io::{
    CountedFrame, DriverError, FfmpegTools, FrameReport, FrameSource, InputKind, Pacer,
    RunSummary, StdClock,
};
use sheetcount_pipeline::{PipelineConfig, PipelineDiagnostics};
use tracing_subscriber::EnvFilter;

/// Count sheets in a stack from an image or video of its edge.
///
/// Accepts JPEG, PNG, BMP and WebP stills, animated GIFs, and MP4, MOV,
/// AVI, MKV and WebM videos (the latter through `ffmpeg`).
#[derive(Debug, Parser)]
#[command(name = "sheetcount", version)]
struct Cli {
    /// Path to the input image or video.
    input: PathBuf,

    /// Gaussian kernel size (odd; 1 disables smoothing).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_KERNEL_SIZE)]
    blur_kernel_size: u32,

    /// Canny low (linking) threshold.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_EDGE_LOW_THRESHOLD)]
    edge_low_threshold: f32,

    /// Canny high (seed) threshold.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_EDGE_HIGH_THRESHOLD)]
    edge_high_threshold: f32,

    /// Number of 3x3 dilation passes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_DILATE_ITERATIONS)]
    dilate_iterations: u32,

    /// Number of 3x3 erosion passes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_ERODE_ITERATIONS)]
    erode_iterations: u32,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Deliver video frames at their declared frame rate.
    #[arg(long)]
    realtime: bool,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Write each frame's edge mask here.
    ///
    /// For videos, `{}` is replaced by the frame number, or one is
    /// appended to the file name.
    #[arg(long)]
    mask_out: Option<PathBuf>,

    /// Write each frame with its contours drawn in green here.
    ///
    /// Same naming rules as `--mask-out`.
    #[arg(long)]
    overlay_out: Option<PathBuf>,

    /// Write every intermediate stage as PNGs into this directory.
    #[arg(long)]
    stages: Option<PathBuf>,

    /// Scale written images to WIDTHxHEIGHT (400x400 if no value given).
    #[arg(long, num_args = 0..=1, default_missing_value = "400x400")]
    preview_size: Option<PreviewSize>,

    /// Print a per-stage timing report for every frame.
    #[arg(long)]
    diagnostics: bool,

    /// Print JSON lines instead of text.
    #[arg(long)]
    json: bool,

    /// `ffmpeg` executable used to decode videos.
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// `ffprobe` executable used to read video properties.
    #[arg(long, default_value = "ffprobe")]
    ffprobe: PathBuf,
}

/// One JSON output line.
#[derive(Serialize)]
struct JsonLine<'a> {
    #[serde(flatten)]
    report: &'a FrameReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<&'a PipelineDiagnostics>,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        PipelineConfig {
            blur_kernel_size: cli.blur_kernel_size,
            edge_low_threshold: cli.edge_low_threshold,
            edge_high_threshold: cli.edge_high_threshold,
            dilate_iterations: cli.dilate_iterations,
            erode_iterations: cli.erode_iterations,
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            tracing::error!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(?config, "pipeline configuration");

    match run(&cli, &config) {
        Ok(summary) if summary.frames == 0 && summary.skipped > 0 => {
            tracing::error!("no frame could be counted");
            ExitCode::FAILURE
        }
        Ok(summary) => {
            tracing::info!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(input = %cli.input.display(), "{e}");
            ExitCode::FAILURE
        }
    }
}

/// Count every frame of the input, printing one line per frame.
fn run(cli: &Cli, config: &PipelineConfig) -> Result<RunSummary, DriverError> {
    let tools = FfmpegTools {
        ffmpeg: cli.ffmpeg.clone(),
        ffprobe: cli.ffprobe.clone(),
    };
    let sequence = InputKind::detect(&cli.input)?.is_sequence();
    let source = FrameSource::open(&cli.input, &tools)?;
    let limit = cli.max_frames.unwrap_or(usize::MAX);

    let mut pacer = cli.realtime.then(|| Pacer::new(StdClock));
    let mut summary = RunSummary::default();

    for timed in source.take(limit) {
        let timed = match timed {
            Ok(timed) => timed,
            Err(e) if e.is_frame_local() => {
                tracing::warn!("skipping undecodable frame: {e}");
                summary.skip();
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Some(pacer) = pacer.as_mut() {
            pacer.pace(timed.delay);
        }

        let index = timed.index;
        let counted = match sheetcount_io::count_frame(timed, config, &StdClock) {
            Ok(counted) => counted,
            Err(e) if e.is_frame_local() => {
                tracing::warn!(frame = index, "skipping frame: {e}");
                summary.skip();
                continue;
            }
            Err(e) => return Err(e),
        };

        print_frame(cli, &counted)?;
        write_outputs(cli, &counted, sequence)?;
        summary.record(&counted.report);
    }

    Ok(summary)
}

/// Print the count (and optionally diagnostics) for one frame.
fn print_frame(cli: &Cli, counted: &CountedFrame) -> Result<(), DriverError> {
    if cli.json {
        let line = JsonLine {
            report: &counted.report,
            diagnostics: cli.diagnostics.then_some(&counted.diagnostics),
        };
        let json = serde_json::to_string(&line).map_err(std::io::Error::other)?;
        println!("{json}");
    } else {
        println!("{}", counted.report);
        if cli.diagnostics {
            println!("{}", counted.diagnostics.report());
            println!();
        }
    }
    Ok(())
}

/// Write the mask, overlay and stage images requested on the command line.
fn write_outputs(cli: &Cli, counted: &CountedFrame, sequence: bool) -> Result<(), DriverError> {
    let index = counted.report.frame;
    if let Some(template) = &cli.mask_out {
        let mask = DynamicImage::ImageLuma8(counted.staged.mask.as_image().clone());
        save_preview(mask, template, index, sequence, cli.preview_size)?;
    }
    if let Some(template) = &cli.overlay_out {
        let overlay = render::overlay(&counted.frame, &counted.staged.contours)?;
        save_preview(
            DynamicImage::ImageRgb8(overlay),
            template,
            index,
            sequence,
            cli.preview_size,
        )?;
    }
    if let Some(dir) = &cli.stages {
        render::write_stages(&counted.staged, &counted.frame, dir, index, cli.preview_size)?;
    }
    Ok(())
}

fn save_preview(
    image: DynamicImage,
    template: &Path,
    index: usize,
    sequence: bool,
    size: Option<PreviewSize>,
) -> Result<(), DriverError> {
    let path = render::frame_output_path(template, index, sequence);
    render::save(&render::preview(image, size), &path)
}
