//! Decoded frame buffers.
//!
//! - `Frame`: Row-major pixel buffer (height x width x channels). Owned by the
//!   invocation that produced it and dropped once the output handler returns.
//!
//! Frames are not `Clone`. Analytics receive `&Frame` and cannot keep the
//! buffer past the call.

use std::path::Path;

use image::DynamicImage;

use crate::error::StreamError;

/// Decoded image buffer, opaque to the core beyond its dimensions.
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

// Explicitly NOT implementing Clone. One owner per invocation.

impl Frame {
    /// Wrap a row-major buffer. The buffer length must equal
    /// `width * height * channels`.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self, StreamError> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(StreamError::Decode(format!(
                "frame dimensions must be non-zero (got {}x{}x{})",
                height, width, channels
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(StreamError::Decode(format!(
                "buffer holds {} bytes, {}x{}x{} needs {}",
                pixels.len(),
                height,
                width,
                channels,
                expected
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
            channels,
        })
    }

    /// Frame with every byte set to `value`.
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Result<Self, StreamError> {
        let len = width as usize * height as usize * channels as usize;
        Self::new(vec![value; len], width, height, channels)
    }

    /// Decode an encoded image payload (JPEG, PNG, GIF).
    pub fn decode(bytes: &[u8]) -> Result<Self, StreamError> {
        if bytes.is_empty() {
            return Err(StreamError::Decode("empty payload".to_string()));
        }
        let image =
            image::load_from_memory(bytes).map_err(|e| StreamError::Decode(e.to_string()))?;
        Ok(Self::from_image(image))
    }

    /// Read and decode an image file. Failure means the source is unavailable.
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let image = image::open(path)
            .map_err(|e| StreamError::unavailable(path.display().to_string(), e))?;
        Ok(Self::from_image(image))
    }

    /// Convert a decoded image. Grayscale images keep one channel; everything
    /// else is converted to packed RGB.
    pub fn from_image(image: DynamicImage) -> Self {
        let width = image.width();
        let height = image.height();
        match image {
            DynamicImage::ImageLuma8(buf) => Self {
                pixels: buf.into_raw(),
                width,
                height,
                channels: 1,
            },
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) => Self {
                pixels: image.to_luma8().into_raw(),
                width,
                height,
                channels: 1,
            },
            other => Self {
                pixels: other.to_rgb8().into_raw(),
                width,
                height,
                channels: 3,
            },
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// `(height, width, channels)`, matching the row-major layout.
    pub fn shape(&self) -> (u32, u32, u8) {
        (self.height, self.width, self.channels)
    }

    /// Read-only pixel bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Channel values of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * c;
        self.pixels.get(start..start + c)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("height", &self.height)
            .field("width", &self.width)
            .field("channels", &self.channels)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
