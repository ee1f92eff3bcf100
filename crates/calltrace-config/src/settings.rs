//! Setting value types shared by every configuration layer.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where finalized call records are written
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Resolved output sink
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    #[default]
    Stdout,
    Stderr,
    File(PathBuf),
}

/// Which engine events the tracer subscribes to
///
/// `Profile` mirrors a profiling hook: it never observes exception events,
/// so abnormal exits only carry the "detail unknown" marker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    #[default]
    Trace,
    Profile,
}

/// How the tracer decides between a genuine return and an abnormal unwind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierPolicy {
    /// Trust the outcome reported by instrumented routines, inspect the
    /// exit instruction only for uninstrumented ones.
    #[default]
    Cooperative,
    /// Always inspect the exit instruction.
    Instruction,
}

impl FromStr for OutputTarget {
    type Err = ConfigError;

    /// `stdout`, `stderr`, or anything else as a file path
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(ConfigError::InvalidValue {
                field: "output".to_string(),
                reason: "output target cannot be empty".to_string(),
            }),
            "stdout" | "-" => Ok(OutputTarget::Stdout),
            "stderr" => Ok(OutputTarget::Stderr),
            path => Ok(OutputTarget::File(PathBuf::from(path))),
        }
    }
}

impl FromStr for TraceMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(TraceMode::Trace),
            "profile" => Ok(TraceMode::Profile),
            other => Err(ConfigError::InvalidValue {
                field: "tracer.mode".to_string(),
                reason: format!("must be 'trace' or 'profile', got '{}'", other),
            }),
        }
    }
}

impl FromStr for ClassifierPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cooperative" => Ok(ClassifierPolicy::Cooperative),
            "instruction" => Ok(ClassifierPolicy::Instruction),
            other => Err(ConfigError::InvalidValue {
                field: "tracer.classifier".to_string(),
                reason: format!("must be 'cooperative' or 'instruction', got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Stdout => write!(f, "stdout"),
            OutputTarget::Stderr => write!(f, "stderr"),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_target_from_str() {
        assert_eq!("stdout".parse::<OutputTarget>().unwrap(), OutputTarget::Stdout);
        assert_eq!("-".parse::<OutputTarget>().unwrap(), OutputTarget::Stdout);
        assert_eq!("stderr".parse::<OutputTarget>().unwrap(), OutputTarget::Stderr);
        assert_eq!(
            "trace.jsonl".parse::<OutputTarget>().unwrap(),
            OutputTarget::File(PathBuf::from("trace.jsonl"))
        );
        assert!("  ".parse::<OutputTarget>().is_err());
    }

    #[test]
    fn test_mode_and_policy_from_str() {
        assert_eq!("PROFILE".parse::<TraceMode>().unwrap(), TraceMode::Profile);
        assert_eq!(
            "instruction".parse::<ClassifierPolicy>().unwrap(),
            ClassifierPolicy::Instruction
        );
        assert!("sampling".parse::<TraceMode>().is_err());
        assert!("bytecode".parse::<ClassifierPolicy>().is_err());
    }
}
