//! Layered config loading.

use super::WardenConfig;
use crate::error::WardenError;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

/// Loads `WardenConfig` from defaults, an optional file, and the environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate.
    ///
    /// Precedence: defaults (lowest), then `path` if given, then `WARDEN__*`
    /// environment variables (highest). Nested keys use `__`, e.g.
    /// `WARDEN__SPAWNER__BATCH_SIZE=50`.
    pub fn load(path: Option<&Path>) -> Result<WardenConfig, WardenError> {
        let mut builder = Self::builder_with_defaults()?;
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading config file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("WARDEN")
                .separator("__")
                .try_parsing(true),
        );

        let config: WardenConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text on top of the defaults, without the environment
    pub fn from_toml_str(text: &str) -> Result<WardenConfig, WardenError> {
        let config: WardenConfig = Self::builder_with_defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(config: &WardenConfig) -> Result<String, WardenError> {
        toml::to_string_pretty(config)
            .map_err(|e| WardenError::ConfigError(format!("Failed to render config: {}", e)))
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, WardenError> {
        let defaults = Config::try_from(&WardenConfig::default())?;
        Ok(Config::builder().add_source(defaults))
    }
}
