//! Rendering of masks, contour overlays and per-stage previews.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use sheetcount_pipeline::{Contour, Frame, PipelineError, StagedResult};

use crate::error::DriverError;

/// Contour overlay color.
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Placeholder in output path templates replaced by the frame index.
pub const INDEX_PLACEHOLDER: &str = "{}";

/// Display size previews are scaled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PreviewSize {
    /// Square preview used by default.
    pub const DEFAULT: Self = Self {
        width: 400,
        height: 400,
    };
}

impl FromStr for PreviewSize {
    type Err = String;

    /// Parse `WIDTHxHEIGHT`, e.g. `400x400`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
        let parse = |v: &str| match v.trim().parse::<u32>() {
            Ok(0) | Err(_) => Err(format!("invalid preview dimension {v:?}")),
            Ok(n) => Ok(n),
        };
        Ok(Self {
            width: parse(w)?,
            height: parse(h)?,
        })
    }
}

impl std::fmt::Display for PreviewSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Draw every contour as a closed green polyline over the frame.
///
/// # Errors
///
/// Returns [`DriverError::Pipeline`] if the frame's channel layout
/// cannot be shown as RGB.
pub fn overlay(frame: &Frame, contours: &[Contour]) -> Result<RgbImage, DriverError> {
    let mut canvas = frame.to_rgb_image().ok_or_else(|| {
        PipelineError::InvalidFrame(format!(
            "cannot display {}-channel frame",
            frame.channels()
        ))
    })?;
    for contour in contours {
        let points = contour.points();
        match points {
            [] => {}
            [only] => canvas.put_pixel(only.x, only.y, OVERLAY_COLOR),
            _ => {
                for (i, from) in points.iter().enumerate() {
                    let to = points[(i + 1) % points.len()];
                    #[allow(clippy::cast_precision_loss)]
                    draw_line_segment_mut(
                        &mut canvas,
                        (from.x as f32, from.y as f32),
                        (to.x as f32, to.y as f32),
                        OVERLAY_COLOR,
                    );
                }
            }
        }
    }
    Ok(canvas)
}

/// Scale an image to the preview size with bilinear filtering.
///
/// `None` returns the image at its original size.
#[must_use]
pub fn preview(image: DynamicImage, size: Option<PreviewSize>) -> DynamicImage {
    match size {
        Some(size) if (image.width(), image.height()) != (size.width, size.height) => {
            image.resize_exact(size.width, size.height, FilterType::Triangle)
        }
        _ => image,
    }
}

/// Write an image, creating parent directories as needed.
///
/// The encoding follows the path's extension.
///
/// # Errors
///
/// Returns [`DriverError::Io`] if the directory cannot be created or
/// [`DriverError::Image`] if encoding fails.
pub fn save(image: &DynamicImage, path: &Path) -> Result<(), DriverError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image.save(path)?;
    tracing::debug!(path = %path.display(), "wrote image");
    Ok(())
}

/// Output path for frame `index`.
///
/// A `{}` in the template is replaced with the zero-padded index. For a
/// sequence without a placeholder, `-NNNNN` is appended to the file
/// stem so frames do not overwrite each other. Single frames use the
/// template unchanged.
#[must_use]
pub fn frame_output_path(template: &Path, index: usize, sequence: bool) -> PathBuf {
    let text = template.to_string_lossy();
    if text.contains(INDEX_PLACEHOLDER) {
        return PathBuf::from(text.replace(INDEX_PLACEHOLDER, &format!("{index:05}")));
    }
    if !sequence {
        return template.to_path_buf();
    }
    let stem = template
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let name = match template.extension() {
        Some(ext) => format!("{stem}-{index:05}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{index:05}"),
    };
    template.with_file_name(name)
}

/// Write a PNG for every intermediate stage of one frame into `dir`.
///
/// Files are named `NNNNN-<stage>.png`. Returns the written paths in
/// pipeline order.
///
/// # Errors
///
/// Returns the first error from [`save`].
pub fn write_stages(
    staged: &StagedResult,
    frame: &Frame,
    dir: &Path,
    index: usize,
    size: Option<PreviewSize>,
) -> Result<Vec<PathBuf>, DriverError> {
    let stages = [
        ("grayscale", DynamicImage::ImageLuma8(staged.grayscale.clone())),
        ("blurred", DynamicImage::ImageLuma8(staged.blurred.clone())),
        ("edges", DynamicImage::ImageLuma8(staged.edges.clone())),
        ("dilated", DynamicImage::ImageLuma8(staged.dilated.clone())),
        (
            "mask",
            DynamicImage::ImageLuma8(staged.mask.as_image().clone()),
        ),
        (
            "contours",
            DynamicImage::ImageRgb8(overlay(frame, &staged.contours)?),
        ),
    ];
    let mut written = Vec::with_capacity(stages.len());
    for (name, image) in stages {
        let path = dir.join(format!("{index:05}-{name}.png"));
        save(&preview(image, size), &path)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::GrayImage;
    use sheetcount_pipeline::{PipelineConfig, Point};

    use super::*;

    #[test]
    fn preview_size_parses() {
        assert_eq!(
            "640x480".parse::<PreviewSize>().unwrap(),
            PreviewSize {
                width: 640,
                height: 480
            }
        );
        assert_eq!("400X400".parse::<PreviewSize>().unwrap(), PreviewSize::DEFAULT);
        assert!("400".parse::<PreviewSize>().is_err());
        assert!("0x10".parse::<PreviewSize>().is_err());
        assert!("ax10".parse::<PreviewSize>().is_err());
        assert_eq!(PreviewSize::DEFAULT.to_string(), "400x400");
    }

    #[test]
    fn overlay_draws_closed_contour() {
        let frame = Frame::from_luma_image(&GrayImage::new(10, 10));
        let square = Contour::new(vec![
            Point::new(2, 2),
            Point::new(6, 2),
            Point::new(6, 6),
            Point::new(2, 6),
        ]);
        let canvas = overlay(&frame, &[square]).unwrap();
        assert_eq!(*canvas.get_pixel(4, 2), OVERLAY_COLOR);
        assert_eq!(*canvas.get_pixel(2, 4), OVERLAY_COLOR);
        assert_eq!(*canvas.get_pixel(4, 4), Rgb([0, 0, 0]));
    }

    #[test]
    fn overlay_marks_single_point_contours() {
        let frame = Frame::from_luma_image(&GrayImage::new(4, 4));
        let canvas = overlay(&frame, &[Contour::new(vec![Point::new(1, 3)])]).unwrap();
        assert_eq!(*canvas.get_pixel(1, 3), OVERLAY_COLOR);
    }

    #[test]
    fn preview_scales_to_requested_size() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(37, 11));
        let scaled = preview(img.clone(), Some(PreviewSize::DEFAULT));
        assert_eq!((scaled.width(), scaled.height()), (400, 400));
        let original = preview(img, None);
        assert_eq!((original.width(), original.height()), (37, 11));
    }

    #[test]
    fn frame_paths() {
        let t = Path::new("out/mask.png");
        assert_eq!(frame_output_path(t, 3, false), PathBuf::from("out/mask.png"));
        assert_eq!(frame_output_path(t, 3, true), PathBuf::from("out/mask-00003.png"));
        assert_eq!(
            frame_output_path(Path::new("out/{}.png"), 12, false),
            PathBuf::from("out/00012.png")
        );
        assert_eq!(frame_output_path(Path::new("mask"), 1, true), PathBuf::from("mask-00001"));
    }

    #[test]
    fn save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/mask.png");
        save(&DynamicImage::ImageLuma8(GrayImage::new(3, 3)), &path).unwrap();
        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (3, 3));
    }

    #[test]
    fn stages_are_written_in_order() {
        let img = GrayImage::from_fn(20, 20, |x, y| {
            image::Luma([if (5..15).contains(&x) && (5..15).contains(&y) { 255 } else { 0 }])
        });
        let frame = Frame::from_luma_image(&img);
        let staged = sheetcount_pipeline::process_staged(&frame, &PipelineConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let written = write_stages(&staged, &frame, dir.path(), 7, None).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            [
                "00007-grayscale.png",
                "00007-blurred.png",
                "00007-edges.png",
                "00007-dilated.png",
                "00007-mask.png",
                "00007-contours.png",
            ]
        );
        assert!(written.iter().all(|p| p.exists()));
    }
}
