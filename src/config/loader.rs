//! Configuration Loader
//!
//! Layers configuration sources with the `config` crate:
//! 1. Built-in defaults ([`UploaderConfig::default`], applied per missing field)
//! 2. An optional TOML file (explicit path or `UPLOADER_CONFIG_PATH`)
//! 3. `UPLOADER_*` environment variables
//!
//! The merged result is deserialized and validated; an invalid value is an
//! error, never a silent fallback.

use super::error::{ConfigResult, ConfigurationError};
use super::UploaderConfig;
use crate::constants::env;
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Builder for loading an [`UploaderConfig`] from layered sources
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_source: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the process environment, honouring `UPLOADER_CONFIG_PATH`
    pub fn from_env() -> ConfigResult<UploaderConfig> {
        let mut loader = Self::new();
        if let Ok(path) = std::env::var(env::CONFIG_PATH) {
            loader = loader.with_file(path);
        }
        loader.load()
    }

    /// Load from a TOML file plus environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<UploaderConfig> {
        Self::new().with_file(path.as_ref()).load()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replace the process environment with an explicit variable map.
    ///
    /// Keys use the same `UPLOADER_` names as real environment variables.
    /// Useful for testing without modifying global state.
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    pub fn load(self) -> ConfigResult<UploaderConfig> {
        // Fields absent from every source take their serde defaults
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            debug!(path = %path.display(), "Loading uploader configuration file");
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(env::CONFIG_PREFIX)
                .try_parsing(true)
                .source(self.env_source.clone()),
        );

        let source_name = self
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let merged = builder
            .build()
            .map_err(|e| ConfigurationError::load_failed(source_name, e))?;

        let config: UploaderConfig =
            merged
                .try_deserialize()
                .map_err(|e| ConfigurationError::Deserialization {
                    error: e.to_string(),
                })?;

        config.validate()?;

        debug!(
            retry_attempts = config.retry_attempts,
            max_concurrent_tasks = config.max_concurrent_tasks,
            attempt_timeout_ms = config.attempt_timeout_ms,
            "Uploader configuration loaded"
        );

        Ok(config)
    }
}
