//! Global Configuration (~/.calltrace/config.toml)
//!
//! Handles user-level defaults stored in `~/.calltrace/config.toml`.
//! The sections mirror the project file; project settings win on merge.

use crate::project::{
    validate_logging, validate_output, LoggingConfig, OutputConfig, ProjectConfig, TracerConfig,
};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.calltrace/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default record sink
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,

    /// Default tracer behaviour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracer: Option<TracerConfig>,

    /// Default logging filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate(path)?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self, file: &Path) -> ConfigResult<()> {
        if let Some(output) = &self.output {
            validate_output(output, file)?;
        }
        if let Some(logging) = &self.logging {
            validate_logging(logging)?;
        }
        Ok(())
    }

    /// Get the global config file path (~/.calltrace/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".calltrace").join("config.toml"))
    }
}

impl From<&GlobalConfig> for ProjectConfig {
    fn from(global: &GlobalConfig) -> Self {
        ProjectConfig {
            output: global.output.clone(),
            tracer: global.tracer.clone(),
            logging: global.logging.clone(),
        }
    }
}
