use anyhow::{ensure, Result};

use crate::analytic::Analytic;
use crate::envelope::{InputFrame, RegionOfInterest, Regions};
use crate::frame::Frame;

/// Reports the same unboxed region for every frame.
#[derive(Clone, Debug)]
pub struct StaticAnalytic {
    label: String,
    confidence: f32,
}

impl StaticAnalytic {
    pub fn new(label: impl Into<String>, confidence: f32) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&confidence),
            "confidence must be within [0, 1], got {}",
            confidence
        );
        Ok(Self {
            label: label.into(),
            confidence,
        })
    }
}

impl Analytic for StaticAnalytic {
    fn name(&self) -> &str {
        "static"
    }

    fn analyze(&mut self, _frame: &Frame, _input: &InputFrame) -> Result<Regions> {
        Ok(Regions::new().with(RegionOfInterest::new(self.label.clone(), self.confidence)))
    }
}
