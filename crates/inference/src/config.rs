//! Pipeline configuration: defaults, optional JSON file, `EARSCOPE_*` environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vision_core::NormalizeConfig;

use crate::factory::ModelSpec;
use crate::storage::DEFAULT_URL_PREFIX;
use crate::triage::{TriageConfig, DEFAULT_CONFIDENCE_THRESHOLD};

pub const ENV_PREFIX: &str = "EARSCOPE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value `{value}` for {key}")]
    Env { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub normalize: NormalizeConfig,
    pub confidence_threshold: f32,
    /// Directory batch overlays are written to.
    pub overlay_dir: PathBuf,
    /// URL prefix the overlay directory is served under.
    pub overlay_url_prefix: String,
    /// Batch worker threads; 1 processes items sequentially.
    pub workers: usize,
    pub stage1: ModelSpec,
    pub stage2: ModelSpec,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            normalize: NormalizeConfig::default(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            overlay_dir: PathBuf::from("outputs"),
            overlay_url_prefix: DEFAULT_URL_PREFIX.to_string(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            stage1: ModelSpec::stage1(),
            stage2: ModelSpec::stage2(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps full variable names to values.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };
        if let Some((key, value)) = get("THRESHOLD") {
            self.confidence_threshold = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = get("WORKERS") {
            self.workers = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = get("TARGET_SIZE") {
            let (w, h) = parse_size(&value).ok_or(ConfigError::Env { key, value })?;
            self.normalize.width = w;
            self.normalize.height = h;
        }
        if let Some((key, value)) = get("MAX_INPUT_BYTES") {
            self.normalize.max_input_bytes = parse_env(&key, &value)?;
        }
        if let Some((_, value)) = get("OVERLAY_DIR") {
            self.overlay_dir = PathBuf::from(value);
        }
        if let Some((_, value)) = get("OVERLAY_URL_PREFIX") {
            self.overlay_url_prefix = value;
        }
        if let Some((_, value)) = get("STAGE1_WEIGHTS") {
            self.stage1.checkpoint = PathBuf::from(value);
        }
        if let Some((_, value)) = get("STAGE2_WEIGHTS") {
            self.stage2.checkpoint = PathBuf::from(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.triage().validate()?;
        if self.normalize.width == 0 || self.normalize.height == 0 {
            return Err(ConfigError::Invalid("target size must be non-zero".into()));
        }
        if self.normalize.max_input_bytes == 0 {
            return Err(ConfigError::Invalid("max_input_bytes must be non-zero".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.stage1.arch.num_classes != 3 || self.stage2.arch.num_classes != 2 {
            return Err(ConfigError::Invalid(
                "stage 1 needs 3 classes and stage 2 needs 2".into(),
            ));
        }
        Ok(())
    }

    pub fn triage(&self) -> TriageConfig {
        TriageConfig {
            confidence_threshold: self.confidence_threshold,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// `"500"` or `"640x480"`.
pub fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let raw = raw.trim();
    match raw.split_once(['x', 'X']) {
        Some((w, h)) => Some((w.trim().parse().ok()?, h.trim().parse().ok()?)),
        None => raw.parse().ok().map(|s| (s, s)),
    }
}
