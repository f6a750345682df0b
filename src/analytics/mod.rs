//! Builtin analytics.
//!
//! - `static`: one fixed region per frame (demo / smoke testing)
//! - `motion`: frame-to-frame change detection over the raw pixel digest
//!
//! Custom analytics implement [`crate::Analytic`] directly or are registered
//! with [`AnalyticRegistry::register`].

mod motion;
mod registry;
mod static_label;

use serde::Deserialize;

pub use motion::MotionAnalytic;
pub use registry::{AnalyticFactory, AnalyticRegistry};
pub use static_label::StaticAnalytic;

/// Analytic selection and parameters shared by the builtin factories.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyticSettings {
    /// Registry name of the analytic to run.
    pub name: String,
    /// Label emitted by `static`.
    pub label: String,
    /// Confidence emitted by `static`.
    pub confidence: f32,
}

impl Default for AnalyticSettings {
    fn default() -> Self {
        Self {
            name: "static".to_string(),
            label: "Person".to_string(),
            confidence: 0.506,
        }
    }
}
