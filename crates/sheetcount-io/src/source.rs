//! Frame sources: still images, animated GIFs, and `ffmpeg`-decoded
//! video containers.
//!
//! Every source yields [`TimedFrame`]s in display order. A frame's
//! `delay` is how long it stays on screen before the next one, as
//! declared by the container; stills have a zero delay.

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageReader};
use serde::Deserialize;
use sheetcount_pipeline::Frame;

use crate::error::DriverError;
use crate::input::InputKind;

/// Frame rate assumed when a container does not declare one.
pub const FALLBACK_FRAME_RATE: f64 = 30.0;

/// One decoded frame and its display time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedFrame {
    /// Zero-based position in the source.
    pub index: usize,
    /// The decoded BGR frame.
    pub frame: Frame,
    /// How long the frame is displayed before the next one.
    pub delay: Duration,
}

/// Paths of the external tools used for video containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    /// The `ffmpeg` executable.
    pub ffmpeg: PathBuf,
    /// The `ffprobe` executable.
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// Stream of frames from one input.
pub enum FrameSource {
    /// A single still image, taken on the first call to `next`.
    Still(Option<Frame>),
    /// Frames of an animated GIF.
    Gif(GifFrames),
    /// Frames piped from an `ffmpeg` child process.
    Video(FfmpegFrames),
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Still(frame) => f.debug_tuple("Still").field(&frame.is_some()).finish(),
            Self::Gif(gif) => f.debug_tuple("Gif").field(&gif.index).finish(),
            Self::Video(video) => f.debug_tuple("Video").field(&video.info).finish(),
        }
    }
}

impl FrameSource {
    /// Open `path`, detecting its kind.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::UnsupportedInputFormat`] for unknown
    /// inputs, or the decode/spawn error of the detected source.
    pub fn open(path: &Path, tools: &FfmpegTools) -> Result<Self, DriverError> {
        match InputKind::detect(path)? {
            InputKind::Still(_) => Ok(Self::Still(Some(decode_still(path)?))),
            InputKind::Gif => Ok(Self::Gif(GifFrames::open(path)?)),
            InputKind::Video => Ok(Self::Video(FfmpegFrames::spawn(path, tools)?)),
        }
    }
}

impl Iterator for FrameSource {
    type Item = Result<TimedFrame, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Still(frame) => frame.take().map(|frame| {
                Ok(TimedFrame {
                    index: 0,
                    frame,
                    delay: Duration::ZERO,
                })
            }),
            Self::Gif(gif) => gif.next(),
            Self::Video(video) => video.next(),
        }
    }
}

/// Decode a still image into a BGR frame.
///
/// Alpha is dropped and grayscale images are expanded to three equal
/// channels.
///
/// # Errors
///
/// Returns [`DriverError::Io`] or [`DriverError::Image`] if the file
/// cannot be read or decoded.
pub fn decode_still(path: &Path) -> Result<Frame, DriverError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(Frame::from_rgb_image(&image.to_rgb8()))
}

/// Frames of an animated GIF, composited onto the full canvas.
///
/// The first decode error ends the stream: it is yielded once and every
/// later call returns `None`.
pub struct GifFrames {
    frames: image::Frames<'static>,
    index: usize,
    done: bool,
}

impl GifFrames {
    /// Open a GIF file for frame-by-frame decoding.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] or [`DriverError::Image`] if the file
    /// cannot be opened or its header is malformed.
    pub fn open(path: &Path) -> Result<Self, DriverError> {
        let file = BufReader::new(std::fs::File::open(path)?);
        let decoder = GifDecoder::new(file)?;
        Ok(Self {
            frames: decoder.into_frames(),
            index: 0,
            done: false,
        })
    }
}

impl Iterator for GifFrames {
    type Item = Result<TimedFrame, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let frame = match self.frames.next() {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                // The decoder repeats a stream error forever; stop here.
                self.done = true;
                tracing::debug!(frames = self.index, "gif stream ended with an error");
                return Some(Err(e.into()));
            }
            None => {
                self.done = true;
                return None;
            }
        };
        let index = self.index;
        self.index += 1;
        let delay = Duration::from(frame.delay());
        let rgb = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
        Some(Ok(TimedFrame {
            index,
            frame: Frame::from_rgb_image(&rgb),
            delay,
        }))
    }
}

/// Stream properties reported by `ffprobe`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Declared frames per second, if any.
    pub frame_rate: Option<f64>,
}

impl VideoInfo {
    /// Display time of one frame.
    ///
    /// Rates whose period does not fit a `Duration` get the
    /// [`FALLBACK_FRAME_RATE`] period.
    #[must_use]
    pub fn frame_delay(&self) -> Duration {
        let rate = self.frame_rate.unwrap_or(FALLBACK_FRAME_RATE);
        Duration::try_from_secs_f64(1.0 / rate)
            .or_else(|_| Duration::try_from_secs_f64(1.0 / FALLBACK_FRAME_RATE))
            .unwrap_or_default()
    }

    /// Bytes in one packed `bgr24` frame.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: u32,
    height: u32,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    r_frame_rate: Option<String>,
}

/// Query the first video stream of `path`.
///
/// # Errors
///
/// Returns [`DriverError::VideoDecode`] if `ffprobe` cannot be run,
/// fails, or reports no video stream.
pub fn probe(path: &Path, tools: &FfmpegTools) -> Result<VideoInfo, DriverError> {
    let output = Command::new(&tools.ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            DriverError::VideoDecode(format!(
                "cannot run {}: {e}",
                tools.ffprobe.display()
            ))
        })?;
    if !output.status.success() {
        return Err(DriverError::VideoDecode(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim(),
        )));
    }
    parse_probe_output(&output.stdout)
}

fn parse_probe_output(json: &[u8]) -> Result<VideoInfo, DriverError> {
    let parsed: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| DriverError::VideoDecode(format!("unreadable ffprobe output: {e}")))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| DriverError::VideoDecode("no video stream".to_owned()))?;
    if stream.width == 0 || stream.height == 0 {
        return Err(DriverError::VideoDecode(format!(
            "empty video stream ({}x{})",
            stream.width, stream.height
        )));
    }
    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate));
    Ok(VideoInfo {
        width: stream.width,
        height: stream.height,
        frame_rate,
    })
}

/// Parse an `ffprobe` rate such as `"30000/1001"` or `"25"`.
///
/// Returns `None` for `"0/0"` and other non-positive or malformed rates.
#[must_use]
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Packed `bgr24` frames of a fixed size read back to back from a byte
/// stream.
///
/// The stream ends cleanly when it runs out exactly on a frame boundary.
/// A partial trailing frame is an `UnexpectedEof` error, after which the
/// iterator is exhausted.
pub struct RawFrames<R> {
    reader: R,
    width: u32,
    height: u32,
    delay: Duration,
    index: usize,
    done: bool,
}

impl<R: Read> RawFrames<R> {
    /// Read `width` x `height` frames from `reader`, each shown for
    /// `delay`.
    pub const fn new(reader: R, width: u32, height: u32, delay: Duration) -> Self {
        Self {
            reader,
            width,
            height,
            delay,
            index: 0,
            done: false,
        }
    }

    /// Frames yielded so far.
    #[must_use]
    pub const fn frames_read(&self) -> usize {
        self.index
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl<R: Read> Iterator for RawFrames<R> {
    type Item = Result<TimedFrame, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; self.frame_len()];
        match read_full(&mut self.reader, &mut buf) {
            Ok(true) if !buf.is_empty() => {}
            Ok(_) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        }
        let index = self.index;
        self.index += 1;
        Some(
            Frame::from_bgr(self.width, self.height, buf)
                .map(|frame| TimedFrame {
                    index,
                    frame,
                    delay: self.delay,
                })
                .map_err(DriverError::from),
        )
    }
}

/// Raw `bgr24` frames read from an `ffmpeg` child process.
///
/// The child is reaped when the stream ends, and killed and reaped on a
/// read error or when this value is dropped early.
pub struct FfmpegFrames {
    child: Child,
    frames: RawFrames<BufReader<ChildStdout>>,
    info: VideoInfo,
    reaped: bool,
}

impl FfmpegFrames {
    /// Probe `path` and start decoding it.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::VideoDecode`] if probing fails or `ffmpeg`
    /// cannot be started.
    pub fn spawn(path: &Path, tools: &FfmpegTools) -> Result<Self, DriverError> {
        let info = probe(path, tools)?;
        if info.frame_rate.is_none() {
            tracing::warn!(
                path = %path.display(),
                fallback = FALLBACK_FRAME_RATE,
                "container declares no frame rate"
            );
        }
        let child = Command::new(&tools.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "bgr24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                DriverError::VideoDecode(format!("cannot run {}: {e}", tools.ffmpeg.display()))
            })?;
        tracing::info!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.frame_rate.unwrap_or(FALLBACK_FRAME_RATE),
            "decoding video"
        );
        Self::from_child(child, info)
    }

    /// Read `info`-sized frames from the piped stdout of `child`.
    fn from_child(mut child: Child, info: VideoInfo) -> Result<Self, DriverError> {
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DriverError::VideoDecode("ffmpeg stdout unavailable".to_owned()));
        };
        Ok(Self {
            child,
            frames: RawFrames::new(
                BufReader::new(stdout),
                info.width,
                info.height,
                info.frame_delay(),
            ),
            info,
            reaped: false,
        })
    }

    /// Properties of the stream being decoded.
    #[must_use]
    pub const fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Wait for the child after a clean end of its output.
    fn finish(&mut self) -> Option<Result<TimedFrame, DriverError>> {
        self.reaped = true;
        match self.child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => Some(Err(DriverError::VideoDecode(format!(
                "ffmpeg exited with {status}"
            )))),
            Err(e) => Some(Err(e.into())),
        }
    }

    /// Kill and reap the child if it has not been reaped yet.
    fn terminate(&mut self) {
        if self.reaped {
            return;
        }
        self.reaped = true;
        // Kill fails for a child that already exited; wait still reaps it.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Iterator for FfmpegFrames {
    type Item = Result<TimedFrame, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reaped {
            return None;
        }
        match self.frames.next() {
            Some(Ok(frame)) => Some(Ok(frame)),
            Some(Err(e)) => {
                tracing::debug!(frames = self.frames.frames_read(), "ffmpeg output ended mid-frame");
                self.terminate();
                Some(Err(e))
            }
            None => self.finish(),
        }
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Fill `buf` completely from `reader`.
///
/// Returns `Ok(false)` on a clean end of stream before any byte was
/// read, and an `UnexpectedEof` error if the stream ends mid-buffer.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("truncated frame: {filled} of {} bytes", buf.len()),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
