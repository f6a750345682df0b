use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::analytics::AnalyticSettings;
use crate::ingest::CameraConfig;
use crate::output::OutputMode;
use crate::service::ServiceConfig;

const DEFAULT_PROGRESS_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamerConfigFile {
    analytic: Option<AnalyticSettings>,
    output: Option<OutputMode>,
    service: Option<ServiceConfig>,
    camera: Option<CameraConfig>,
    progress_interval_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub analytic: AnalyticSettings,
    pub output: OutputMode,
    pub service: ServiceConfig,
    pub camera: CameraConfig,
    pub progress_interval: Duration,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self::from_file(StreamerConfigFile::default())
    }
}

impl StreamerConfig {
    /// Load from `VIDSTREAMER_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VIDSTREAMER_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults when `None`), then apply env
    /// overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => StreamerConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: StreamerConfigFile) -> Self {
        Self {
            analytic: file.analytic.unwrap_or_default(),
            output: file.output.unwrap_or_default(),
            service: file.service.unwrap_or_default(),
            camera: file.camera.unwrap_or_default(),
            progress_interval: Duration::from_secs(
                file.progress_interval_secs
                    .unwrap_or(DEFAULT_PROGRESS_INTERVAL_SECS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("VIDSTREAMER_SERVICE_ADDR") {
            self.service.addr = addr;
        }
        if let Some(name) = env_value("VIDSTREAMER_ANALYTIC") {
            self.analytic.name = name;
        }
        if let Some(output) = env_value("VIDSTREAMER_OUTPUT") {
            self.output = OutputMode::from_str(&output, true)
                .map_err(|_| anyhow!("VIDSTREAMER_OUTPUT must be one of summary, json, none"))?;
        }
        if let Some(limit) = env_value("VIDSTREAMER_MAX_BODY_BYTES") {
            self.service.max_body_bytes = limit
                .parse()
                .map_err(|_| anyhow!("VIDSTREAMER_MAX_BODY_BYTES must be an integer byte count"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.analytic.confidence) {
            return Err(anyhow!(
                "analytic.confidence must be within [0, 1], got {}",
                self.analytic.confidence
            ));
        }
        if self.analytic.name.trim().is_empty() {
            return Err(anyhow!("analytic.name must not be empty"));
        }
        if self.service.max_body_bytes == 0 {
            return Err(anyhow!("service.max_body_bytes must be greater than zero"));
        }
        if self.service.max_connections == 0 {
            return Err(anyhow!("service.max_connections must be greater than zero"));
        }
        self.service
            .addr
            .parse::<SocketAddr>()
            .with_context(|| format!("service.addr '{}' is not a socket address", self.service.addr))?;
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera.target_fps must be greater than zero"));
        }
        if self.progress_interval.is_zero() {
            return Err(anyhow!("progress_interval_secs must be greater than zero"));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<StreamerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
