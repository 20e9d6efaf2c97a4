use crate::aggregator::SourcesMap;
use crate::layout::RadiusBand;
use crate::models::{SourceRef, Subject};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("invalid config {path:?}: {source}")]
    Parse { path: PathBuf, source: serde_yaml::Error },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HearthConfig {
    pub sources: Vec<SourceConf>,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub listen: String,
    pub mock: bool,
    pub mqtt: Option<MqttConf>,
    pub layout: RadiusBand,
}

/// One entry of `sources:`. Entries sharing url+token are merged.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConf {
    #[serde(flatten)]
    pub instance: SourceRef,
    #[serde(default)]
    pub people: Vec<Subject>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            poll_interval_secs: 10,
            request_timeout_secs: 5,
            listen: "0.0.0.0:8080".into(),
            mock: false,
            mqtt: None,
            layout: RadiusBand::default(),
        }
    }
}

impl HearthConfig {
    /// Instance -> people, duplicate entries merged.
    pub fn sources(&self) -> SourcesMap {
        let mut sources = SourcesMap::new();
        for entry in &self.sources {
            sources
                .entry(entry.instance.clone())
                .or_insert_with(HashSet::new)
                .extend(entry.people.iter().cloned());
        }
        sources
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be > 0".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be > 0".into()));
        }
        let band = self.layout;
        if !(0.0..=1.0).contains(&band.min_radius)
            || !(0.0..=1.0).contains(&band.max_radius)
            || band.min_radius > band.max_radius
        {
            return Err(ConfigError::Invalid(format!(
                "layout radii must satisfy 0 <= min_radius <= max_radius <= 1 (got {} / {})",
                band.min_radius, band.max_radius
            )));
        }
        Ok(())
    }
}

/// Path from `HEARTH_CONFIG`, `hearth.yaml` otherwise.
pub fn config_path() -> PathBuf {
    std::env::var("HEARTH_CONFIG")
        .unwrap_or_else(|_| "hearth.yaml".into())
        .into()
}

pub async fn load_config() -> Result<HearthConfig, ConfigError> {
    load_config_from(&config_path()).await
}

/// Missing or empty file -> defaults. JSON is accepted too (YAML superset).
pub async fn load_config_from(path: &Path) -> Result<HearthConfig, ConfigError> {
    if !path.exists() {
        warn!("no config at {:?}, using defaults", path);
        return Ok(HearthConfig::default());
    }

    let txt = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    if txt.trim().is_empty() {
        warn!("empty config at {:?}, using defaults", path);
        return Ok(HearthConfig::default());
    }

    let cfg: HearthConfig = serde_yaml::from_str(&txt)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    cfg.validate()?;
    info!("loaded {} source entries from {:?}", cfg.sources.len(), path);
    Ok(cfg)
}
