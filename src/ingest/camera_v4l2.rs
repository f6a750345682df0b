//! V4L2 camera capture.
//!
//! Requests packed RGB (`RGB3`). Devices that only offer MJPEG are decoded
//! with `image`; any other pixel format is rejected at open time.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::camera::CameraConfig;
use crate::error::StreamError;
use crate::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PixelLayout {
    Rgb,
    Mjpeg,
}

pub(crate) struct DeviceCamera {
    config: CameraConfig,
    state: DeviceState,
    layout: PixelLayout,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
    stopped: bool,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceCamera {
    pub(crate) fn open(config: CameraConfig) -> Result<Self, StreamError> {
        let device = config.device.clone();
        Self::connect(config).map_err(|e| StreamError::unavailable(device, format!("{e:#}")))
    }

    fn connect(config: CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        let layout = if format.fourcc == v4l::FourCC::new(b"RGB3") {
            PixelLayout::Rgb
        } else if format.fourcc == v4l::FourCC::new(b"MJPG") {
            PixelLayout::Mjpeg
        } else {
            return Err(anyhow!("unsupported pixel format {}", format.fourcc));
        };

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        // Bounded dequeue: a timed-out capture ends the sequence.
        let timeout = config.capture_timeout();
        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                let mut stream =
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| {
                            anyhow::Error::new(err).context("create v4l2 buffer stream")
                        })?;
                stream.set_timeout(timeout);
                Ok::<_, anyhow::Error>(stream)
            },
        }
        .try_build()?;

        log::info!(
            "CameraSource: connected to {} ({}x{}, {:?}, capture timeout {:?})",
            config.device,
            format.width,
            format.height,
            layout,
            timeout
        );
        Ok(Self {
            active_width: format.width,
            active_height: format.height,
            config,
            state,
            layout,
            frame_count: 0,
            stopped: false,
        })
    }

    pub(crate) fn device(&self) -> &str {
        &self.config.device
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Next captured frame. A failed capture ends the sequence.
    pub(crate) fn next_frame(&mut self) -> Option<Frame> {
        if self.stopped {
            return None;
        }
        match self.capture() {
            Ok(frame) => {
                self.frame_count += 1;
                Some(frame)
            }
            Err(err) => {
                log::warn!(
                    "CameraSource: no frame available from {}: {:#}",
                    self.config.device,
                    err
                );
                self.stopped = true;
                None
            }
        }
    }

    fn capture(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let (width, height, layout) = (self.active_width, self.active_height, self.layout);
        self.state.with_mut(|fields| {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            let frame = match layout {
                PixelLayout::Rgb => {
                    let len = width as usize * height as usize * 3;
                    let pixels = buf.get(..len).context("short v4l2 frame")?.to_vec();
                    Frame::new(pixels, width, height, 3)?
                }
                PixelLayout::Mjpeg => Frame::decode(buf)?,
            };
            Ok(frame)
        })
    }
}
