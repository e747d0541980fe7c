use crate::models::SessionCredentials;
use crate::store::write_atomic;
use serde::Deserialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(String),
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "GRAILED")]
    pub grailed: GrailedSettings,
    #[serde(rename = "OPENAI", default)]
    pub openai: OpenAiSettings,
    #[serde(rename = "ALGOLIA")]
    pub algolia: AlgoliaSettings,
    #[serde(rename = "AUTH", default)]
    pub auth: SessionCredentials,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GrailedSettings {
    pub designer: String,
    /// Milliseconds between monitoring cycles.
    pub monitoring_interval: u64,
    pub lowball_percentage: f64,
    /// Fixed headers sent with every messaging request.
    #[serde(default)]
    pub api_headers: BTreeMap<String, String>,
}

impl GrailedSettings {
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_millis(self.monitoring_interval)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OpenAiSettings {
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AlgoliaSettings {
    pub api_key: String,
    pub app_id: String,
}

impl AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.grailed.designer.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "GRAILED.DESIGNER",
                reason: "must not be empty",
            });
        }
        if self.grailed.monitoring_interval == 0 {
            return Err(ConfigError::Invalid {
                field: "GRAILED.MONITORING_INTERVAL",
                reason: "must be greater than zero",
            });
        }
        let fraction = self.grailed.lowball_percentage;
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(ConfigError::Invalid {
                field: "GRAILED.LOWBALL_PERCENTAGE",
                reason: "must be within (0, 1]",
            });
        }
        Ok(())
    }
}

/// The JSON configuration file. Read once at startup; the `AUTH` block is
/// rewritten after every session refresh.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Self {
        let path = std::env::var("LOWBALL_CONFIG")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "config.json".to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let raw = fs::read(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut config: AppConfig =
            serde_json::from_slice(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        if config.auth.device_id.trim().is_empty() {
            config.auth.device_id = Uuid::new_v4().to_string();
            match self.save_credentials(&config.auth) {
                Ok(()) => info!(
                    target = "lowball.config",
                    device_id = %config.auth.device_id,
                    "generated device id"
                ),
                Err(err) => warn!(
                    target = "lowball.config",
                    error = %err,
                    "failed to persist generated device id"
                ),
            }
        }
        Ok(config)
    }

    /// Replaces the `AUTH` block, keeping every other key as it is on disk.
    pub fn save_credentials(&self, credentials: &SessionCredentials) -> Result<(), ConfigError> {
        let raw = fs::read(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut document: Value =
            serde_json::from_slice(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        let Some(root) = document.as_object_mut() else {
            return Err(ConfigError::Parse("top level is not an object".into()));
        };
        let auth =
            serde_json::to_value(credentials).map_err(|err| ConfigError::Parse(err.to_string()))?;
        root.insert("AUTH".to_string(), auth);

        let pretty = serde_json::to_vec_pretty(&document)
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        write_atomic(&self.path, &pretty).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
