//! Video file source.
//!
//! This module provides `VideoSource` for frames from a local video file.
//! The video source is responsible for:
//! - Opening the file (or failing with `SourceUnavailable`)
//! - Decoding frames in order, one per `read_frame`
//! - Ending the sequence on end-of-stream or on the first unreadable frame
//! - Releasing the file handle when dropped
//!
//! Animated GIF is decoded with `image`. Other containers go through FFmpeg
//! (feature: video-ffmpeg). `stub://` paths produce synthetic clips.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, Frames};

use super::synthetic::SyntheticFrames;
#[cfg(feature = "video-ffmpeg")]
use super::video_ffmpeg::FfmpegVideo;
use super::{FrameSource, StubSpec};
use crate::error::StreamError;
use crate::frame::Frame;

const STUB_WIDTH: u32 = 320;
const STUB_HEIGHT: u32 = 240;
const STUB_FRAMES: u64 = 30;

/// Local video file source.
pub struct VideoSource {
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticFrames),
    Gif(GifVideo),
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegVideo),
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let origin = path.to_string_lossy().to_string();
        if origin.trim().is_empty() {
            return Err(StreamError::unavailable(origin, "empty video path"));
        }
        if let Some(mut spec) = StubSpec::parse(&origin)? {
            spec.frames = Some(spec.frames.unwrap_or(STUB_FRAMES));
            log::info!("VideoSource: opened {} (synthetic)", origin);
            return Ok(Self {
                backend: VideoBackend::Synthetic(SyntheticFrames::new(
                    &origin,
                    &spec,
                    STUB_WIDTH,
                    STUB_HEIGHT,
                )),
            });
        }
        if origin.contains("://") {
            return Err(StreamError::unavailable(
                origin,
                "video ingestion only supports local paths",
            ));
        }

        let is_gif = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gif"));
        if is_gif {
            return Ok(Self {
                backend: VideoBackend::Gif(GifVideo::open(path)?),
            });
        }

        #[cfg(feature = "video-ffmpeg")]
        {
            Ok(Self {
                backend: VideoBackend::Ffmpeg(FfmpegVideo::open(path)?),
            })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(StreamError::unavailable(
                origin,
                "this video format requires the video-ffmpeg feature",
            ))
        }
    }
}

impl FrameSource for VideoSource {
    fn describe(&self) -> String {
        match &self.backend {
            VideoBackend::Synthetic(source) => source.origin().to_string(),
            VideoBackend::Gif(source) => source.path.clone(),
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.path().to_string(),
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        match &mut self.backend {
            VideoBackend::Synthetic(source) => source.next_frame(),
            VideoBackend::Gif(source) => Ok(source.next_frame()),
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => Ok(source.next_frame()),
        }
    }

    fn frames_read(&self) -> u64 {
        match &self.backend {
            VideoBackend::Synthetic(source) => source.frame_count(),
            VideoBackend::Gif(source) => source.frame_count,
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.frame_count(),
        }
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        log::info!(
            "VideoSource: released {} after {} frames",
            self.describe(),
            self.frames_read()
        );
    }
}

// ----------------------------------------------------------------------------
// Animated GIF via `image`
// ----------------------------------------------------------------------------

struct GifVideo {
    path: String,
    frames: Frames<'static>,
    frame_count: u64,
    ended: bool,
}

impl GifVideo {
    fn open(path: &Path) -> Result<Self, StreamError> {
        let origin = path.display().to_string();
        let file = File::open(path).map_err(|e| StreamError::unavailable(origin.as_str(), e))?;
        let decoder = GifDecoder::new(BufReader::new(file))
            .map_err(|e| StreamError::unavailable(origin.as_str(), e))?;
        log::info!("VideoSource: opened {} (gif)", origin);
        Ok(Self {
            path: origin,
            frames: decoder.into_frames(),
            frame_count: 0,
            ended: false,
        })
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.ended {
            return None;
        }
        match self.frames.next() {
            Some(Ok(frame)) => {
                self.frame_count += 1;
                Some(Frame::from_image(DynamicImage::ImageRgba8(frame.into_buffer())))
            }
            Some(Err(err)) => {
                log::warn!(
                    "VideoSource: unreadable frame after {} in {}: {}",
                    self.frame_count,
                    self.path,
                    err
                );
                self.ended = true;
                None
            }
            None => {
                self.ended = true;
                None
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
