use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use super::{AnalyticSettings, MotionAnalytic, StaticAnalytic};
use crate::analytic::Analytic;

/// Builds a fresh analytic from settings.
pub type AnalyticFactory = Box<dyn Fn(&AnalyticSettings) -> Result<Box<dyn Analytic>> + Send + Sync>;

/// Name → factory table used to pick an analytic at startup.
///
/// Factories produce a new instance per call, so every invoker owns its
/// analytic outright.
pub struct AnalyticRegistry {
    factories: BTreeMap<String, AnalyticFactory>,
}

impl AnalyticRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with `static` and `motion` registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("static", |settings: &AnalyticSettings| {
            let analytic = StaticAnalytic::new(settings.label.clone(), settings.confidence)?;
            Ok(Box::new(analytic) as Box<dyn Analytic>)
        });
        registry.register("motion", |_: &AnalyticSettings| {
            Ok(Box::new(MotionAnalytic::new()) as Box<dyn Analytic>)
        });
        registry
    }

    /// Register a factory. Re-registering a name replaces the previous one.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&AnalyticSettings) -> Result<Box<dyn Analytic>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Instantiate the analytic registered as `name`.
    pub fn create(&self, name: &str, settings: &AnalyticSettings) -> Result<Box<dyn Analytic>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "analytic '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        factory(settings)
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for AnalyticRegistry {
    fn default() -> Self {
        Self::new()
    }
}
