//! Calltrace Runtime - bytecode VM with a per-call tracing hook
//!
//! This library provides:
//! - A stack-based bytecode VM whose frames expose identity, bindings,
//!   source location and their compiled instruction stream
//! - A trace hook interface fired on call, line, instruction, exception
//!   and return boundaries
//! - A tracer that emits one JSON record per invocation, classifying each
//!   frame exit as a genuine return or an exception unwind

/// Calltrace runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bytecode;
pub mod function;
pub mod logging;
pub mod tracer;
pub mod value;
pub mod vm;

// Re-export commonly used types
pub use bytecode::{Chunk, Opcode};
pub use function::{CallConvention, ClassBuilder, ClassDef, FunctionDef, Signature};
pub use tracer::Tracer;
pub use value::{RuntimeError, Value};
pub use vm::{ExitKind, FrameId, FrameView, TraceError, TraceEvent, TraceHook, VM};
