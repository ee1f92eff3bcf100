//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{OutputConfig, ProjectConfig};
use crate::settings::{ClassifierPolicy, OutputKind, OutputTarget, TraceMode};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "calltrace.toml";

/// Default `tracing-subscriber` filter when nothing is configured
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.calltrace/config.toml) - lowest priority
/// 2. Project config (./calltrace.toml) - overrides global
/// 3. Environment variables (CALLTRACE_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Merged settings from every layer
    pub settings: ProjectConfig,

    /// Directory where calltrace.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config file instead of ~/.calltrace/config.toml
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find calltrace.toml, then layers it over
    /// the global config and applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        self.assemble(project_config, project_root)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());
        self.assemble(project_config, project_root)
    }

    fn assemble(
        &mut self,
        project_config: ProjectConfig,
        project_root: Option<PathBuf>,
    ) -> ConfigResult<Config> {
        // Global config is optional; an unreadable one falls back to defaults
        let global_config = self.load_global_config().unwrap_or_default();

        let mut settings = ProjectConfig::from(&global_config);
        settings.merge(&project_config);
        let settings = self.apply_env_overrides(settings)?;

        Ok(Config {
            settings,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config) or error if not found
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.calltrace/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides
    ///
    /// - CALLTRACE_OUTPUT: `stdout`, `stderr`, or a file path
    /// - CALLTRACE_MODE: `trace` or `profile`
    /// - CALLTRACE_CLASSIFIER: `cooperative` or `instruction`
    /// - CALLTRACE_LOG: logging filter directive
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(output) = env::var("CALLTRACE_OUTPUT") {
            let target: OutputTarget = output.parse()?;
            let section = config.output.get_or_insert_with(OutputConfig::default);
            match target {
                OutputTarget::Stdout => section.target = Some(OutputKind::Stdout),
                OutputTarget::Stderr => section.target = Some(OutputKind::Stderr),
                OutputTarget::File(path) => {
                    section.target = Some(OutputKind::File);
                    section.path = Some(path);
                }
            }
        }

        if let Ok(mode) = env::var("CALLTRACE_MODE") {
            let mode: TraceMode = mode.parse()?;
            config.tracer.get_or_insert_with(Default::default).mode = Some(mode);
        }

        if let Ok(classifier) = env::var("CALLTRACE_CLASSIFIER") {
            let classifier: ClassifierPolicy = classifier.parse()?;
            config.tracer.get_or_insert_with(Default::default).classifier = Some(classifier);
        }

        if let Ok(filter) = env::var("CALLTRACE_LOG") {
            if filter.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "CALLTRACE_LOG".to_string(),
                    reason: "filter cannot be empty".to_string(),
                });
            }
            config.logging.get_or_insert_with(Default::default).filter = Some(filter);
        }

        Ok(config)
    }

    /// Get the global configuration directory (~/.calltrace)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".calltrace"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Effective output sink (default: stdout)
    ///
    /// A `file` target without a path cannot survive validation, so it only
    /// reaches here through a hand-built config; it falls back to stdout.
    pub fn output(&self) -> OutputTarget {
        let Some(output) = &self.settings.output else {
            return OutputTarget::Stdout;
        };
        match (output.target.unwrap_or_default(), &output.path) {
            (OutputKind::Stdout, _) => OutputTarget::Stdout,
            (OutputKind::Stderr, _) => OutputTarget::Stderr,
            (OutputKind::File, Some(path)) => OutputTarget::File(self.resolve_path(path)),
            (OutputKind::File, None) => OutputTarget::Stdout,
        }
    }

    /// Whether the sink is flushed after every record (default: true)
    pub fn flush(&self) -> bool {
        self.settings
            .output
            .as_ref()
            .and_then(|o| o.flush)
            .unwrap_or(true)
    }

    /// Effective tracer mode (default: trace)
    pub fn mode(&self) -> TraceMode {
        self.settings
            .tracer
            .as_ref()
            .and_then(|t| t.mode)
            .unwrap_or_default()
    }

    /// Effective classifier policy (default: cooperative)
    pub fn classifier(&self) -> ClassifierPolicy {
        self.settings
            .tracer
            .as_ref()
            .and_then(|t| t.classifier)
            .unwrap_or_default()
    }

    /// Effective logging filter (default: "warn")
    pub fn log_filter(&self) -> &str {
        self.settings
            .logging
            .as_ref()
            .and_then(|l| l.filter.as_deref())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a calltrace.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Relative output paths are anchored at the project root
    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.project_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_CONFIG_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(dir: &TempDir) -> ConfigLoader {
        ConfigLoader::with_global_config_path(dir.path().join("no-global.toml"))
    }

    #[test]
    #[serial]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[tracer]
mode = "profile"
"#,
        );

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.mode(), TraceMode::Profile);
        assert!(config.is_project());
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[output]
target = "stderr"
"#,
        );

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(&sub_dir).unwrap();

        assert_eq!(config.output(), OutputTarget::Stderr);
        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    #[serial]
    fn test_env_override_mode() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[tracer]
mode = "trace"
"#,
        );

        env::set_var("CALLTRACE_MODE", "profile");

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path());

        env::remove_var("CALLTRACE_MODE");

        assert_eq!(config.unwrap().mode(), TraceMode::Profile);
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_bad_value() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var("CALLTRACE_CLASSIFIER", "guess");

        let mut loader = isolated_loader(&temp_dir);
        let result = loader.load_from_directory(temp_dir.path());

        env::remove_var("CALLTRACE_CLASSIFIER");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.output(), OutputTarget::Stdout);
        assert!(config.flush());
        assert_eq!(config.mode(), TraceMode::Trace);
        assert_eq!(config.classifier(), ClassifierPolicy::Cooperative);
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
    }

    #[test]
    #[serial]
    fn test_relative_file_output_anchored_at_root() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config_file(
            temp_dir.path(),
            r#"
[output]
target = "file"
path = "out/trace.jsonl"
"#,
        );

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_file(&config_path).unwrap();

        assert_eq!(
            config.output(),
            OutputTarget::File(temp_dir.path().join("out/trace.jsonl"))
        );
    }
}
