//! Request/response envelope shared by every invocation path.
//!
//! Field names follow the interchange schema (`roi`, `box`, `corner1`, ...)
//! so encoded `FrameData` is readable by existing consumers.

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Request half of the envelope. Immutable after construction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    pub frame_num: u64,
    /// Capture time in seconds since the Unix epoch.
    pub timestamp: f64,
}

impl InputFrame {
    pub fn new(frame_num: u64, timestamp: f64) -> Self {
        Self {
            frame_num,
            timestamp,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box given by two opposite corners.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub corner1: Point,
    pub corner2: Point,
}

impl BoundingBox {
    pub fn new(corner1: Point, corner2: Point) -> Self {
        Self { corner1, corner2 }
    }
}

/// One detected object or area.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    /// Empty means unclassified.
    #[serde(default)]
    pub classification: String,
    pub confidence: f32,
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

impl RegionOfInterest {
    pub fn new(classification: impl Into<String>, confidence: f32) -> Self {
        Self {
            classification: classification.into(),
            confidence,
            bounding_box: None,
        }
    }

    pub fn with_box(mut self, corner1: Point, corner2: Point) -> Self {
        self.bounding_box = Some(BoundingBox::new(corner1, corner2));
        self
    }

    /// Label for display; unclassified regions read "No classification".
    pub fn display_label(&self) -> &str {
        if self.classification.is_empty() {
            "No classification"
        } else {
            &self.classification
        }
    }
}

/// Ordered regions produced by one analytic call.
///
/// This is the only thing an analytic hands back. Timing fields of
/// `FrameData` are stamped by the invoker, never by user code.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Regions {
    items: Vec<RegionOfInterest>,
}

impl Regions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a region. Insertion order is preserved to the output handler.
    pub fn push(&mut self, roi: RegionOfInterest) -> &mut Self {
        self.items.push(roi);
        self
    }

    /// Builder-style `push`.
    pub fn with(mut self, roi: RegionOfInterest) -> Self {
        self.items.push(roi);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionOfInterest> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<RegionOfInterest> {
        self.items
    }
}

impl From<Vec<RegionOfInterest>> for Regions {
    fn from(items: Vec<RegionOfInterest>) -> Self {
        Self { items }
    }
}

impl FromIterator<RegionOfInterest> for Regions {
    fn from_iter<I: IntoIterator<Item = RegionOfInterest>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Response half of the envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameData {
    pub start_time_millis: u64,
    pub end_time_millis: u64,
    #[serde(default)]
    pub roi: Vec<RegionOfInterest>,
}

impl FrameData {
    /// Wall-clock cost of the analytic call.
    pub fn elapsed_millis(&self) -> u64 {
        self.end_time_millis.saturating_sub(self.start_time_millis)
    }
}

pub fn encode_frame_data(data: &FrameData) -> Result<Vec<u8>, StreamError> {
    serde_json::to_vec(data).map_err(|e| StreamError::Decode(format!("encode frame data: {e}")))
}

pub fn decode_frame_data(bytes: &[u8]) -> Result<FrameData, StreamError> {
    serde_json::from_slice(bytes).map_err(|e| StreamError::Decode(format!("frame data: {e}")))
}
