//! Per-call state accumulated between the call and return events

use super::classifier::ExitOutcome;
use crate::function::CallConvention;
use crate::value::Value;
use crate::vm::FrameView;

/// Exception observed for a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionDetail {
    /// String form of the last exception seen by an exception event
    Raised(String),
    /// The frame unwound but no exception event was observed
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Pending,
    Finalized,
}

/// One active invocation's captured state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub name: String,
    /// Receiver type name, or the class itself for class-level routines
    pub class_context: Option<String>,
    /// `"<source file> <line> <routine name>"` at call time
    pub location: String,
    /// Parameter name and string snapshot, in declaration order
    pub args: Vec<(String, String)>,
    pub exception: Option<ExceptionDetail>,
    pub return_value: Option<String>,
    pub status: RecordStatus,
}

impl CallRecord {
    /// Capture a record from a frame at its call event
    ///
    /// Only parameters bound at this moment are captured; the receiver is
    /// reported through `class_context` rather than `args`.
    pub fn capture(frame: &FrameView<'_>) -> Self {
        let class_context = match (frame.convention(), frame.receiver()) {
            (CallConvention::Instance, Some(receiver)) => Some(receiver.type_name().to_string()),
            (CallConvention::Type, Some(Value::Class(class))) => Some(class.name.clone()),
            (CallConvention::Type, Some(other)) => Some(other.type_name().to_string()),
            _ => None,
        };

        let args = frame
            .arguments()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v.to_string())))
            .collect();

        Self {
            name: frame.name().to_string(),
            class_context,
            location: format!("{} {} {}", frame.source_file(), frame.line(), frame.name()),
            args,
            exception: None,
            return_value: None,
            status: RecordStatus::Pending,
        }
    }

    /// Record an exception event; the latest one wins
    pub fn record_exception(&mut self, exception: &Value) {
        self.exception = Some(ExceptionDetail::Raised(exception.to_string()));
    }

    /// Settle the outcome once; later calls are ignored
    pub fn finalize(&mut self, outcome: ExitOutcome, value: &Value) {
        if self.is_finalized() {
            return;
        }
        match outcome {
            ExitOutcome::Completed => self.return_value = Some(value.to_string()),
            ExitOutcome::Unwound => {
                if self.exception.is_none() {
                    self.exception = Some(ExceptionDetail::Unknown);
                }
            }
        }
        self.status = RecordStatus::Finalized;
    }

    pub fn is_finalized(&self) -> bool {
        self.status == RecordStatus::Finalized
    }
}
