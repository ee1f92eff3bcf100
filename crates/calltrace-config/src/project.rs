//! Project Configuration (calltrace.toml)
//!
//! Handles project-level configuration stored in `calltrace.toml` at the project root.

use crate::settings::{ClassifierPolicy, OutputKind, TraceMode};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration from calltrace.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Record sink
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,

    /// Tracer behaviour
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracer: Option<TracerConfig>,

    /// Diagnostic logging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Output sink configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Sink kind (default: stdout)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<OutputKind>,

    /// File path, required when `target = "file"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Flush after every record (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush: Option<bool>,
}

/// Tracer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct TracerConfig {
    /// Event subscription mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<TraceMode>,

    /// Return-vs-exception classification policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<ClassifierPolicy>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive (e.g. "calltrace_runtime=debug")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    pub fn validate(&self, file: &Path) -> ConfigResult<()> {
        if let Some(output) = &self.output {
            validate_output(output, file)?;
        }
        if let Some(logging) = &self.logging {
            validate_logging(logging)?;
        }
        Ok(())
    }

    /// Merge another project config into this one, section by section.
    /// Fields set in `other` win.
    pub fn merge(&mut self, other: &ProjectConfig) {
        if let Some(output) = &other.output {
            let base = self.output.get_or_insert_with(Default::default);
            base.target = output.target.or(base.target);
            if output.path.is_some() {
                base.path = output.path.clone();
            }
            base.flush = output.flush.or(base.flush);
        }
        if let Some(tracer) = &other.tracer {
            let base = self.tracer.get_or_insert_with(Default::default);
            base.mode = tracer.mode.or(base.mode);
            base.classifier = tracer.classifier.or(base.classifier);
        }
        if let Some(logging) = &other.logging {
            let base = self.logging.get_or_insert_with(Default::default);
            if logging.filter.is_some() {
                base.filter = logging.filter.clone();
            }
        }
    }
}

pub(crate) fn validate_output(output: &OutputConfig, file: &Path) -> ConfigResult<()> {
    match (output.target, &output.path) {
        (Some(OutputKind::File), None) => Err(ConfigError::MissingField {
            field: "output.path".to_string(),
            file: file.to_path_buf(),
        }),
        (Some(OutputKind::File), Some(path)) if path.as_os_str().is_empty() => {
            Err(ConfigError::InvalidValue {
                field: "output.path".to_string(),
                reason: "path cannot be empty".to_string(),
            })
        }
        _ => Ok(()),
    }
}

pub(crate) fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    match &logging.filter {
        Some(filter) if filter.trim().is_empty() => Err(ConfigError::InvalidValue {
            field: "logging.filter".to_string(),
            reason: "filter cannot be empty".to_string(),
        }),
        _ => Ok(()),
    }
}
