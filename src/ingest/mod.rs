//! Frame ingestion sources.
//!
//! This module provides the local sources a pipeline can drive:
//! - Single image files
//! - Video files (animated GIF natively, other containers with feature
//!   `video-ffmpeg`)
//! - Cameras (V4L2 devices with feature `camera-v4l2`)
//! - Synthetic `stub://` video and camera sources (testing)
//!
//! Every source yields bare `Frame`s. `FrameSequence` numbers them from 0 and
//! stamps each with the wall-clock time at read, so numbering and timestamps
//! follow one rule regardless of origin.
//!
//! Sources own their file or device handle and release it on drop, so the
//! handle is freed on every exit path of a run.

mod camera;
#[cfg(feature = "camera-v4l2")]
mod camera_v4l2;
mod image_file;
mod synthetic;
mod video;
#[cfg(feature = "video-ffmpeg")]
mod video_ffmpeg;

use std::path::PathBuf;

pub use camera::{CameraConfig, CameraSource};
pub use image_file::ImageSource;
pub use video::VideoSource;

use crate::error::StreamError;
use crate::frame::Frame;

/// A lazy, ordered, finite (or cancellable) supply of frames.
pub trait FrameSource {
    /// Human-readable origin (path or device) for logs and errors.
    fn describe(&self) -> String;

    /// Read the next frame. `Ok(None)` ends the sequence normally.
    fn read_frame(&mut self) -> Result<Option<Frame>, StreamError>;

    /// Frames successfully read so far.
    fn frames_read(&self) -> u64;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        (**self).read_frame()
    }

    fn frames_read(&self) -> u64 {
        (**self).frames_read()
    }
}

/// Where a local run gets its frames from.
#[derive(Clone, Debug)]
pub enum SourceSpec {
    Image(PathBuf),
    Video(PathBuf),
    Camera(CameraConfig),
}

impl SourceSpec {
    /// Acquire the underlying file or device.
    pub fn open(&self) -> Result<Box<dyn FrameSource>, StreamError> {
        let source: Box<dyn FrameSource> = match self {
            SourceSpec::Image(path) => Box::new(ImageSource::open(path)?),
            SourceSpec::Video(path) => Box::new(VideoSource::open(path)?),
            SourceSpec::Camera(config) => Box::new(CameraSource::open(config.clone())?),
        };
        log::info!("source connected: {}", source.describe());
        Ok(source)
    }
}

/// A frame with its sequence number and capture time.
#[derive(Debug)]
pub struct CapturedFrame {
    pub frame: Frame,
    pub frame_num: u64,
    /// Seconds since the Unix epoch, taken when the frame was read.
    pub timestamp: f64,
}

/// Numbers and timestamps frames pulled from a source.
///
/// `frame_num` starts at 0 and increases by one per successfully read frame.
/// Once the source reports the end, or fails, the sequence is fused.
pub struct FrameSequence<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
    next_frame_num: u64,
    finished: bool,
}

impl<'a, S: FrameSource + ?Sized> FrameSequence<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source,
            next_frame_num: 0,
            finished: false,
        }
    }
}

impl<S: FrameSource + ?Sized> Iterator for FrameSequence<'_, S> {
    type Item = Result<CapturedFrame, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.source.read_frame() {
            Ok(Some(frame)) => {
                let captured = CapturedFrame {
                    frame,
                    frame_num: self.next_frame_num,
                    timestamp: crate::epoch_secs(),
                };
                self.next_frame_num += 1;
                Some(Ok(captured))
            }
            Ok(None) => {
                self.finished = true;
                log::info!("No frame available from {}", self.source.describe());
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// Parameters of a `stub://name?frames=N&width=W&height=H` origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StubSpec {
    pub name: String,
    pub frames: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl StubSpec {
    pub(crate) fn parse(origin: &str) -> Result<Option<Self>, StreamError> {
        let Some(rest) = origin.strip_prefix("stub://") else {
            return Ok(None);
        };
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut spec = StubSpec {
            name: name.to_string(),
            frames: None,
            width: None,
            height: None,
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| StreamError::unavailable(origin, "malformed stub parameter"))?;
            let bad = |_| StreamError::unavailable(origin, format!("invalid value for '{key}'"));
            match key {
                "frames" => spec.frames = Some(value.parse().map_err(bad)?),
                "width" => spec.width = Some(value.parse().map_err(bad)?),
                "height" => spec.height = Some(value.parse().map_err(bad)?),
                other => {
                    return Err(StreamError::unavailable(
                        origin,
                        format!("unknown stub parameter '{other}'"),
                    ))
                }
            }
        }
        Ok(Some(spec))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
