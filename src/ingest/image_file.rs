//! Single image source.
//!
//! Decodes the file once at open time and yields exactly one frame. Reading
//! again returns end-of-sequence.

use std::path::Path;

use super::FrameSource;
use crate::error::StreamError;
use crate::frame::Frame;

pub struct ImageSource {
    path: String,
    frame: Option<Frame>,
    frames_read: u64,
}

impl ImageSource {
    /// Decode `path`. Fails with `SourceUnavailable` if it cannot be read or
    /// decoded.
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let frame = Frame::open(path)?;
        Ok(Self {
            path: path.display().to_string(),
            frame: Some(frame),
            frames_read: 0,
        })
    }
}

impl FrameSource for ImageSource {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        let frame = self.frame.take();
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    fn frames_read(&self) -> u64 {
        self.frames_read
    }
}
