//! Runtime values and engine errors

use crate::function::{ClassDef, FunctionDef};
use crate::vm::{CallFrame, TraceError};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Runtime value
///
/// Reference types are shared through `Rc`; the engine is single-threaded.
#[derive(Debug, Clone)]
pub enum Value {
    /// The absent value
    None,
    /// Boolean value
    Bool(bool),
    /// Numeric value (IEEE 754 double-precision)
    Number(f64),
    /// String value (reference-counted, immutable)
    Str(Rc<str>),
    /// Compiled routine
    Function(Rc<FunctionDef>),
    /// Class object
    Class(Rc<ClassDef>),
    /// Instance of a class
    Instance(Rc<Instance>),
    /// Suspended or exhausted generator
    Generator(Rc<Generator>),
    /// Exception object
    Exception(Rc<ExceptionValue>),
}

impl Value {
    /// Runtime type name
    ///
    /// Instances report their class name and exceptions their kind, so the
    /// result doubles as the receiver type recorded by the tracer.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "str",
            Value::Function(_) => "function",
            Value::Class(_) => "type",
            Value::Instance(instance) => &instance.class.name,
            Value::Generator(_) => "generator",
            Value::Exception(exception) => &exception.kind,
        }
    }

    /// Truthiness used by conditional jumps and `Not`
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Build an exception value
    pub fn exception(kind: &str, message: impl Into<String>) -> Self {
        Value::Exception(Rc::new(ExceptionValue::new(kind, message)))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Number(n) => {
                // Format number nicely (no trailing .0 for whole numbers)
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::Instance(instance) => write!(f, "<{} instance>", instance.class.name),
            Value::Generator(generator) => write!(f, "<generator {}>", generator.function.name),
            Value::Exception(exception) => write!(f, "{}", exception),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Instance of a user class
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<ClassDef>,
    pub fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<ClassDef>) -> Self {
        Self {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }
}

/// Exception object: a kind (its runtime type name) and a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionValue {
    pub kind: String,
    pub message: String,
}

impl ExceptionValue {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ExceptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// Built-in exception kinds raised by the engine itself
pub mod exceptions {
    use super::Value;

    pub const EXCEPTION: &str = "Exception";
    pub const ZERO_DIVISION: &str = "ZeroDivisionError";
    pub const TYPE_ERROR: &str = "TypeError";
    pub const NAME_ERROR: &str = "NameError";
    pub const UNBOUND_LOCAL: &str = "UnboundLocalError";
    pub const ATTRIBUTE_ERROR: &str = "AttributeError";
    pub const STOP_ITERATION: &str = "StopIteration";
    pub const VALUE_ERROR: &str = "ValueError";

    pub fn zero_division(message: &str) -> Value {
        Value::exception(ZERO_DIVISION, message)
    }

    pub fn type_error(message: impl Into<String>) -> Value {
        Value::exception(TYPE_ERROR, message)
    }

    pub fn name_error(name: &str) -> Value {
        Value::exception(NAME_ERROR, format!("name '{}' is not defined", name))
    }

    pub fn unbound_local(name: &str) -> Value {
        Value::exception(
            UNBOUND_LOCAL,
            format!("local variable '{}' referenced before assignment", name),
        )
    }

    pub fn attribute_error(type_name: &str, attribute: &str) -> Value {
        Value::exception(
            ATTRIBUTE_ERROR,
            format!("'{}' object has no attribute '{}'", type_name, attribute),
        )
    }

    pub fn stop_iteration() -> Value {
        Value::exception(STOP_ITERATION, "")
    }

    pub fn value_error(message: impl Into<String>) -> Value {
        Value::exception(VALUE_ERROR, message)
    }
}

/// Generator object
///
/// Holds its frame while suspended. A running generator's frame lives on the
/// VM's frame stack instead, so the two never reference each other.
#[derive(Debug)]
pub struct Generator {
    pub function: Rc<FunctionDef>,
    pub(crate) state: RefCell<GeneratorState>,
}

#[derive(Debug)]
pub(crate) enum GeneratorState {
    Suspended(Box<CallFrame>),
    Running,
    Exhausted,
}

impl Generator {
    pub(crate) fn new(function: Rc<FunctionDef>, frame: CallFrame) -> Self {
        Self {
            function,
            state: RefCell::new(GeneratorState::Suspended(Box::new(frame))),
        }
    }

    /// Whether the generator ran to completion
    pub fn is_exhausted(&self) -> bool {
        matches!(*self.state.borrow(), GeneratorState::Exhausted)
    }

    pub(crate) fn take_state(&self, replacement: GeneratorState) -> GeneratorState {
        self.state.replace(replacement)
    }

    pub(crate) fn suspend(&self, frame: CallFrame) {
        *self.state.borrow_mut() = GeneratorState::Suspended(Box::new(frame));
    }

    pub(crate) fn exhaust(&self) {
        *self.state.borrow_mut() = GeneratorState::Exhausted;
    }
}

/// Engine faults that abort execution
///
/// Exceptions raised by the traced program are values, not errors; only
/// one escaping the entry frame surfaces here as [`RuntimeError::Uncaught`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Byte that does not decode to an opcode
    #[error("Unknown opcode {byte:#04x} at offset {offset} in '{function}'")]
    UnknownOpcode {
        byte: u8,
        offset: usize,
        function: String,
    },
    /// Instruction or operand past the end of the code
    #[error("Truncated instruction at offset {offset} in '{function}'")]
    TruncatedInstruction { offset: usize, function: String },
    /// Constant pool index out of range or of the wrong type
    #[error("Invalid constant {index} in '{function}'")]
    InvalidConstant { index: usize, function: String },
    /// Local slot index out of range
    #[error("Invalid local slot {index} in '{function}'")]
    InvalidLocal { index: usize, function: String },
    /// Pop from an empty operand stack
    #[error("Stack underflow in '{function}'")]
    StackUnderflow { function: String },
    /// Operation needs an executing frame but none is active
    #[error("No active frame")]
    NoActiveFrame,
    /// Yield outside a generator frame
    #[error("Yield outside generator in '{function}'")]
    YieldOutsideGenerator { function: String },
    /// Exception propagated out of the entry frame
    #[error("Uncaught exception: {0}")]
    Uncaught(Value),
    /// The installed trace hook failed
    #[error("Trace hook failed: {0}")]
    Hook(#[from] TraceError),
    /// The trace hook is borrowed elsewhere while the VM needs it
    #[error("Trace hook is already borrowed")]
    HookBusy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_snapshots() {
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::from("default").to_string(), "default");
        assert_eq!(
            exceptions::zero_division("division by zero").to_string(),
            "ZeroDivisionError: division by zero"
        );
        assert_eq!(exceptions::stop_iteration().to_string(), "StopIteration");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::None.type_name(), "NoneType");
        assert_eq!(Value::from("x").type_name(), "str");
        assert_eq!(exceptions::type_error("bad").type_name(), "TypeError");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("a").is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }

    #[test]
    fn test_exception_equality_is_structural() {
        assert_eq!(
            exceptions::name_error("x"),
            Value::exception(exceptions::NAME_ERROR, "name 'x' is not defined")
        );
        assert_ne!(exceptions::name_error("x"), exceptions::name_error("y"));
    }
}
