//! Synthetic frame generator behind `stub://` video and camera origins.

use super::StubSpec;
use crate::error::StreamError;
use crate::frame::Frame;

pub(crate) struct SyntheticFrames {
    origin: String,
    width: u32,
    height: u32,
    /// `None` means unbounded (camera).
    limit: Option<u64>,
    frame_count: u64,
    /// Simulated scene state; changes occasionally to simulate motion.
    scene_state: u8,
}

impl SyntheticFrames {
    pub(crate) fn new(origin: &str, spec: &StubSpec, default_width: u32, default_height: u32) -> Self {
        Self {
            origin: origin.to_string(),
            width: spec.width.unwrap_or(default_width).max(1),
            height: spec.height.unwrap_or(default_height).max(1),
            limit: spec.frames,
            frame_count: 0,
            scene_state: 0,
        }
    }

    pub(crate) fn origin(&self) -> &str {
        &self.origin
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        if self.limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let pixels = self.generate_pixels();
        Frame::new(pixels, self.width, self.height, 3).map(Some)
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = self.width as usize * self.height as usize * 3;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_stub_stops_at_limit() {
        let spec = StubSpec::parse("stub://clip?frames=2&width=4&height=2")
            .unwrap()
            .unwrap();
        let mut frames = SyntheticFrames::new("stub://clip", &spec, 640, 480);

        let first = frames.next_frame().unwrap().unwrap();
        assert_eq!(first.shape(), (2, 4, 3));
        assert!(frames.next_frame().unwrap().is_some());
        assert!(frames.next_frame().unwrap().is_none());
        assert_eq!(frames.frame_count(), 2);
    }

    #[test]
    fn consecutive_frames_differ() {
        let spec = StubSpec::parse("stub://cam").unwrap().unwrap();
        let mut frames = SyntheticFrames::new("stub://cam", &spec, 8, 8);
        let a = frames.next_frame().unwrap().unwrap();
        let b = frames.next_frame().unwrap().unwrap();
        assert_ne!(a.pixels(), b.pixels());
    }
}
