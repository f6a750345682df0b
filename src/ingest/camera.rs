//! Camera frame source.
//!
//! This module provides `CameraSource` for frames from an attached camera.
//!
//! The camera source is responsible for:
//! - Opening the device node (e.g., /dev/video0) or failing with
//!   `SourceUnavailable`
//! - Capturing frames in-memory until the device stops delivering
//! - Treating a failed capture as "no frame available" (end of sequence)
//! - Releasing the device when dropped
//!
//! A camera sequence has no natural end. Runs stop on device error, when a
//! capture waits longer than `CameraConfig::capture_timeout`, or when the
//! caller cancels the pipeline.

use std::time::Duration;

use serde::Deserialize;

#[cfg(feature = "camera-v4l2")]
use super::camera_v4l2::DeviceCamera;
use super::synthetic::SyntheticFrames;
use super::{FrameSource, StubSpec};
use crate::error::StreamError;
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or a `stub://` origin.
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Requested capture rate (frames per second).
    pub target_fps: u32,
}

const MIN_CAPTURE_TIMEOUT: Duration = Duration::from_millis(500);
const CAPTURE_TIMEOUT_FRAMES: u32 = 4;

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

impl CameraConfig {
    /// Configuration for camera `id`, i.e. `/dev/video{id}`.
    pub fn for_id(id: u32) -> Self {
        Self {
            device: format!("/dev/video{id}"),
            ..Self::default()
        }
    }

    /// Longest wait for one frame before the device counts as stalled:
    /// four frame periods at `target_fps`, never less than 500 ms.
    pub fn capture_timeout(&self) -> Duration {
        let periods = Duration::from_secs(1) * CAPTURE_TIMEOUT_FRAMES / self.target_fps.max(1);
        periods.max(MIN_CAPTURE_TIMEOUT)
    }
}

/// Attached camera source.
///
/// Uses V4L2 for real devices (feature: camera-v4l2), with a synthetic
/// fallback for `stub://` devices.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticFrames),
    #[cfg(feature = "camera-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    pub fn open(config: CameraConfig) -> Result<Self, StreamError> {
        if let Some(spec) = StubSpec::parse(&config.device)? {
            log::info!("CameraSource: connected to {} (synthetic)", config.device);
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticFrames::new(
                    &config.device,
                    &spec,
                    config.width,
                    config.height,
                )),
            });
        }

        #[cfg(feature = "camera-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(DeviceCamera::open(config)?),
            })
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            Err(StreamError::unavailable(
                config.device,
                "camera capture requires the camera-v4l2 feature",
            ))
        }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.origin().to_string(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(source) => source.device().to_string(),
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(source) => Ok(source.next_frame()),
        }
    }

    fn frames_read(&self) -> u64 {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.frame_count(),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(source) => source.frame_count(),
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        log::info!(
            "CameraSource: released {} after {} frames",
            self.describe(),
            self.frames_read()
        );
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::FrameSequence;

    fn stub_config(device: &str) -> CameraConfig {
        CameraConfig {
            device: device.to_string(),
            width: 64,
            height: 48,
            target_fps: 30,
        }
    }

    #[test]
    fn for_id_maps_to_device_node() {
        assert_eq!(CameraConfig::for_id(2).device, "/dev/video2");
    }

    #[test]
    fn capture_timeout_scales_with_frame_rate() {
        let at = |target_fps| CameraConfig {
            target_fps,
            ..CameraConfig::default()
        };
        assert_eq!(at(30).capture_timeout(), Duration::from_millis(500));
        assert_eq!(at(5).capture_timeout(), Duration::from_millis(800));
        assert_eq!(at(1).capture_timeout(), Duration::from_secs(4));
        assert_eq!(at(0).capture_timeout(), Duration::from_secs(4));
    }

    #[test]
    fn stub_camera_produces_configured_frames() {
        let mut source = CameraSource::open(stub_config("stub://cam")).unwrap();
        let first = source.read_frame().unwrap().expect("frame");
        assert_eq!(first.shape(), (48, 64, 3));
    }

    #[test]
    fn stub_camera_keeps_streaming_until_device_stops() {
        let mut source = CameraSource::open(stub_config("stub://cam?frames=5")).unwrap();
        let nums: Vec<u64> = FrameSequence::new(&mut source)
            .map(|captured| captured.unwrap().frame_num)
            .collect();
        assert_eq!(nums, vec![0, 1, 2, 3, 4]);
    }

    #[cfg(not(feature = "camera-v4l2"))]
    #[test]
    fn device_without_backend_is_unavailable() {
        let result = CameraSource::open(CameraConfig::for_id(0));
        assert!(matches!(result, Err(StreamError::SourceUnavailable { .. })));
    }
}
