//! Video file decoding with FFmpeg.
//!
//! Frames are scaled to packed RGB in-memory. Decoder errors and end of file
//! both end the sequence; only failing to open the file is an error.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use crate::error::StreamError;
use crate::frame::Frame;

pub(crate) struct FfmpegVideo {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    eof_sent: bool,
    ended: bool,
}

impl FfmpegVideo {
    pub(crate) fn open(path: &Path) -> Result<Self, StreamError> {
        let origin = path.display().to_string();
        Self::open_inner(path, origin.clone())
            .map_err(|e| StreamError::unavailable(origin, format!("{e:#}")))
    }

    fn open_inner(path: &Path, origin: String) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video '{}' with ffmpeg", origin))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "VideoSource: opened {} (ffmpeg, {}x{})",
            origin,
            decoder.width(),
            decoder.height()
        );
        Ok(Self {
            path: origin,
            input,
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
            eof_sent: false,
            ended: false,
        })
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Next decoded frame, or `None` once the stream ends or stops decoding.
    pub(crate) fn next_frame(&mut self) -> Option<Frame> {
        if self.ended {
            return None;
        }
        match self.decode_next() {
            Ok(Some(frame)) => {
                self.frame_count += 1;
                Some(frame)
            }
            Ok(None) => {
                self.ended = true;
                None
            }
            Err(err) => {
                log::warn!(
                    "VideoSource: unreadable frame after {} in {}: {:#}",
                    self.frame_count,
                    self.path,
                    err
                );
                self.ended = true;
                None
            }
        }
    }

    fn decode_next(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return convert(&mut self.scaler, &decoded).map(Some);
        }

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return convert(&mut self.scaler, &decoded).map(Some);
            }
        }

        // Input exhausted: flush frames still buffered in the decoder.
        if !self.eof_sent {
            self.decoder.send_eof().context("flush ffmpeg decoder")?;
            self.eof_sent = true;
        }
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return convert(&mut self.scaler, &decoded).map(Some);
        }
        Ok(None)
    }
}

fn convert(
    scaler: &mut ffmpeg::software::scaling::Context,
    decoded: &ffmpeg::frame::Video,
) -> Result<Frame> {
    let mut rgb_frame = ffmpeg::frame::Video::empty();
    scaler
        .run(decoded, &mut rgb_frame)
        .context("scale frame to RGB")?;
    let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
    Ok(Frame::new(pixels, width, height, 3)?)
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0) as usize;
    let data = frame.data(0);

    if stride == row_bytes {
        let packed = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((packed.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
