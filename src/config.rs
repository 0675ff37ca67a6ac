use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::BackendKind;
use crate::payload::ProtocolVariant;
use crate::wire::DEFAULT_MAX_FRAME_BYTES;

pub const CONFIG_PATH_ENV: &str = "DETECT_WORKER_CONFIG";

const DEFAULT_INPUT_WIDTH: u32 = 640;
const DEFAULT_INPUT_HEIGHT: u32 = 640;
const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Deserialize, Default)]
struct WorkerConfigFile {
    protocol: Option<String>,
    max_frame_bytes: Option<usize>,
    stats_interval_secs: Option<u64>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub protocol: ProtocolVariant,
    pub max_frame_bytes: usize,
    /// Zero disables periodic statistics logging.
    pub stats_interval: Duration,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: BackendKind,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            model_path: None,
            input_width: DEFAULT_INPUT_WIDTH,
            input_height: DEFAULT_INPUT_HEIGHT,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolVariant::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            stats_interval: Duration::from_secs(DEFAULT_STATS_INTERVAL_SECS),
            detector: DetectorSettings::default(),
        }
    }
}

/// Command-line overrides, applied after the file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub protocol: Option<ProtocolVariant>,
    pub backend: Option<BackendKind>,
    pub model_path: Option<PathBuf>,
    pub input_size: Option<u32>,
    pub max_frame_bytes: Option<usize>,
    pub stats_interval_secs: Option<u64>,
}

impl WorkerConfig {
    /// Load from the file named by `DETECT_WORKER_CONFIG` (if set) plus
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_with(config_path.as_deref(), &ConfigOverrides::default())
    }

    /// Layering: defaults, then `config_path`, then environment, then
    /// `overrides`. The result is validated.
    pub fn load_with(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.apply_overrides(overrides);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WorkerConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let protocol = match file.protocol.as_deref() {
            Some(raw) => raw.parse()?,
            None => defaults.protocol,
        };
        let detector_file = file.detector.unwrap_or_default();
        let backend = match detector_file.backend.as_deref() {
            Some(raw) => raw.parse()?,
            None => defaults.detector.backend,
        };
        let detector = DetectorSettings {
            backend,
            model_path: detector_file.model_path,
            input_width: detector_file
                .input_width
                .unwrap_or(defaults.detector.input_width),
            input_height: detector_file
                .input_height
                .unwrap_or(defaults.detector.input_height),
        };
        Ok(Self {
            protocol,
            max_frame_bytes: file.max_frame_bytes.unwrap_or(defaults.max_frame_bytes),
            stats_interval: file
                .stats_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.stats_interval),
            detector,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(protocol) = non_empty_env("DETECT_WORKER_PROTOCOL") {
            self.protocol = protocol.parse()?;
        }
        if let Some(backend) = non_empty_env("DETECT_WORKER_BACKEND") {
            self.detector.backend = backend.parse()?;
        }
        if let Some(model) = non_empty_env("DETECT_WORKER_MODEL") {
            self.detector.model_path = Some(PathBuf::from(model));
        }
        if let Some(max) = non_empty_env("DETECT_WORKER_MAX_FRAME_BYTES") {
            self.max_frame_bytes = max.trim().parse().map_err(|_| {
                anyhow!("DETECT_WORKER_MAX_FRAME_BYTES must be an integer number of bytes")
            })?;
        }
        if let Some(interval) = non_empty_env("DETECT_WORKER_STATS_INTERVAL_SECS") {
            let seconds: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("DETECT_WORKER_STATS_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.stats_interval = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(protocol) = overrides.protocol {
            self.protocol = protocol;
        }
        if let Some(backend) = overrides.backend {
            self.detector.backend = backend;
        }
        if let Some(model) = &overrides.model_path {
            self.detector.model_path = Some(model.clone());
        }
        if let Some(size) = overrides.input_size {
            self.detector.input_width = size;
            self.detector.input_height = size;
        }
        if let Some(max) = overrides.max_frame_bytes {
            self.max_frame_bytes = max;
        }
        if let Some(seconds) = overrides.stats_interval_secs {
            self.stats_interval = Duration::from_secs(seconds);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_frame_bytes == 0 {
            return Err(anyhow!("max_frame_bytes must be greater than zero"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        if self.detector.backend == BackendKind::Tract && self.detector.model_path.is_none() {
            return Err(anyhow!("tract backend requires detector.model_path"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<WorkerConfigFile> {
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

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
