use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::analytic::Analytic;
use crate::envelope::{InputFrame, Point, RegionOfInterest, Regions};
use crate::frame::Frame;

const MOTION_LABEL: &str = "motion";
const MOTION_CONFIDENCE: f32 = 0.85;

/// Flags frames whose pixels differ from the previous frame.
///
/// Keeps only the SHA-256 digest of the last frame. A change (including a
/// resolution change) yields one region covering the whole frame. The first
/// frame never reports motion.
#[derive(Default)]
pub struct MotionAnalytic {
    last_digest: Option<[u8; 32]>,
}

impl MotionAnalytic {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analytic for MotionAnalytic {
    fn name(&self) -> &str {
        "motion"
    }

    fn analyze(&mut self, frame: &Frame, _input: &InputFrame) -> Result<Regions> {
        let mut hasher = Sha256::new();
        hasher.update(frame.width().to_le_bytes());
        hasher.update(frame.height().to_le_bytes());
        hasher.update(frame.pixels());
        let digest: [u8; 32] = hasher.finalize().into();

        let motion = self.last_digest.is_some_and(|prev| prev != digest);
        self.last_digest = Some(digest);

        let mut regions = Regions::new();
        if motion {
            let far = Point::new(
                frame.width().saturating_sub(1) as i32,
                frame.height().saturating_sub(1) as i32,
            );
            regions.push(
                RegionOfInterest::new(MOTION_LABEL, MOTION_CONFIDENCE)
                    .with_box(Point::new(0, 0), far),
            );
        }
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_change_between_frames() {
        let mut analytic = MotionAnalytic::new();
        let input = InputFrame::new(0, 0.0);
        let dark = Frame::filled(10, 10, 1, 0).unwrap();
        let bright = Frame::filled(10, 10, 1, 255).unwrap();

        assert!(analytic.analyze(&dark, &input).unwrap().is_empty());

        let moved = analytic.analyze(&bright, &input).unwrap().into_vec();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].classification, "motion");
        let bbox = moved[0].bounding_box.expect("full-frame box");
        assert_eq!(bbox.corner1, Point::new(0, 0));
        assert_eq!(bbox.corner2, Point::new(9, 9));

        assert!(analytic.analyze(&bright, &input).unwrap().is_empty());
    }
}
