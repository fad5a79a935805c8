//! Decode an animated GIF end to end and count every frame.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Rgba, RgbaImage};
use sheetcount_io::{FfmpegTools, FrameSource, InputKind, count_frame};
use sheetcount_pipeline::{NullClock, PipelineConfig};

/// 120x120 frame with `strips` white bars on black.
fn strip_frame(strips: u32) -> RgbaImage {
    RgbaImage::from_fn(120, 120, |x, y| {
        let lit = (20..100).contains(&x)
            && (0..strips).any(|i| {
                let top = 10 + i * 35;
                (top..top + 20).contains(&y)
            });
        if lit {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    })
}

fn write_gif(path: &std::path::Path, strip_counts: &[u32]) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = GifEncoder::new(file);
    encoder.set_repeat(Repeat::Infinite).unwrap();
    let frames = strip_counts.iter().map(|&n| {
        image::Frame::from_parts(strip_frame(n), 0, 0, Delay::from_numer_denom_ms(100, 1))
    });
    encoder.encode_frames(frames).unwrap();
}

#[test]
fn gif_frames_are_decoded_in_order_with_delays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.gif");
    write_gif(&path, &[1, 2, 3]);

    assert_eq!(InputKind::detect(&path).unwrap(), InputKind::Gif);

    let frames: Vec<_> = FrameSource::open(&path, &FfmpegTools::default())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.index, i);
        assert_eq!(frame.delay, Duration::from_millis(100));
        assert_eq!(frame.frame.width(), 120);
        assert_eq!(frame.frame.height(), 120);
    }
}

#[test]
fn every_gif_frame_is_counted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.gif");
    write_gif(&path, &[1, 2, 3]);

    let config = PipelineConfig::default();
    let counts: Vec<usize> = FrameSource::open(&path, &FfmpegTools::default())
        .unwrap()
        .map(|timed| count_frame(timed.unwrap(), &config, &NullClock).unwrap())
        .map(|counted| counted.report.sheets)
        .collect();
    assert_eq!(counts, [1, 2, 3]);
}

#[test]
fn truncated_gif_ends_after_one_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.gif");
    write_gif(&path, &[1, 2, 3]);
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() * 7 / 10]).unwrap();

    let mut source = FrameSource::open(&path, &FfmpegTools::default()).unwrap();
    let items: Vec<_> = source.by_ref().take(50).collect();
    assert!(items.len() < 50, "source kept yielding after the file ended");

    let decoded = items.iter().filter(|item| item.is_ok()).count();
    let errors = items.len() - decoded;
    assert!((1..3).contains(&decoded), "decoded {decoded} frames");
    assert!(errors <= 1, "{errors} errors");
    assert!(source.next().is_none());
    assert!(source.next().is_none());
}
