//! Configuration loading and precedence tests

use calltrace_config::{
    ClassifierPolicy, ConfigError, ConfigLoader, OutputTarget, ProjectConfig, TraceMode,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Layering
// ============================================================================

#[test]
#[serial]
fn test_project_overrides_global() {
    let temp_dir = TempDir::new().unwrap();
    let global = write_file(
        temp_dir.path(),
        "global.toml",
        r#"
[tracer]
mode = "profile"
classifier = "instruction"

[logging]
filter = "info"
"#,
    );
    write_file(
        temp_dir.path(),
        "calltrace.toml",
        r#"
[tracer]
mode = "trace"
"#,
    );

    let mut loader = ConfigLoader::with_global_config_path(global);
    let config = loader.load_from_directory(temp_dir.path()).unwrap();

    assert_eq!(config.mode(), TraceMode::Trace);
    // Untouched by the project file
    assert_eq!(config.classifier(), ClassifierPolicy::Instruction);
    assert_eq!(config.log_filter(), "info");
}

#[test]
#[serial]
fn test_env_overrides_project() {
    let temp_dir = TempDir::new().unwrap();
    write_file(
        temp_dir.path(),
        "calltrace.toml",
        r#"
[output]
target = "stderr"

[logging]
filter = "warn"
"#,
    );

    env::set_var("CALLTRACE_OUTPUT", "stdout");
    env::set_var("CALLTRACE_LOG", "calltrace_runtime=trace");

    let mut loader = ConfigLoader::with_global_config_path(temp_dir.path().join("missing.toml"));
    let config = loader.load_from_directory(temp_dir.path());

    env::remove_var("CALLTRACE_OUTPUT");
    env::remove_var("CALLTRACE_LOG");

    let config = config.unwrap();
    assert_eq!(config.output(), OutputTarget::Stdout);
    assert_eq!(config.log_filter(), "calltrace_runtime=trace");
}

#[test]
#[serial]
fn test_env_output_path_becomes_file_target() {
    let temp_dir = TempDir::new().unwrap();
    let sink = temp_dir.path().join("records.jsonl");

    env::set_var("CALLTRACE_OUTPUT", sink.to_str().unwrap());

    let mut loader = ConfigLoader::with_global_config_path(temp_dir.path().join("missing.toml"));
    let config = loader.load_from_directory(temp_dir.path());

    env::remove_var("CALLTRACE_OUTPUT");

    assert_eq!(config.unwrap().output(), OutputTarget::File(sink));
}

#[test]
#[serial]
fn test_missing_everything_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();

    let mut loader = ConfigLoader::with_global_config_path(temp_dir.path().join("missing.toml"));
    let config = loader.load_from_directory(temp_dir.path()).unwrap();

    assert!(!config.is_project());
    assert_eq!(config.output(), OutputTarget::Stdout);
    assert!(config.flush());
    assert_eq!(config.mode(), TraceMode::Trace);
}

// ============================================================================
// Error reporting
// ============================================================================

#[test]
fn test_invalid_toml_reports_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_file(temp_dir.path(), "calltrace.toml", "[tracer\nmode = 1");

    match ProjectConfig::load_from_file(&path) {
        Err(ConfigError::TomlParseError { file, .. }) => assert_eq!(file, path),
        other => panic!("expected TomlParseError, got {:?}", other),
    }
}

#[test]
fn test_missing_file_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("calltrace.toml");

    assert!(matches!(
        ProjectConfig::load_from_file(&path),
        Err(ConfigError::NotFound(_))
    ));
}

#[rstest]
#[case("[tracer]\nmode = \"sampling\"\n")]
#[case("[tracer]\nclassifier = \"heuristic\"\n")]
#[case("[output]\ntarget = \"socket\"\n")]
#[case("[output]\ntarget = \"file\"\n")]
#[case("[logging]\nfilter = \"  \"\n")]
fn test_rejected_settings(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    let path = write_file(temp_dir.path(), "calltrace.toml", content);

    assert!(ProjectConfig::load_from_file(&path).is_err());
}
