//! Call frame implementation for routine activations

use crate::function::FunctionDef;
use crate::value::{Generator, Value};
use std::fmt;
use std::rc::Rc;

/// Identity of one activation
///
/// Allocated from a per-VM counter and never reused. A generator's frame
/// keeps its identity across suspensions and resumptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Installed exception handler
///
/// `stack_depth` is relative to the frame's stack base so it survives a
/// generator frame being resumed at a different depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Handler {
    pub target: usize,
    pub stack_depth: usize,
}

/// What the caller receives when the frame returns
#[derive(Debug, Clone)]
pub(crate) enum FrameKind {
    /// The returned value
    Plain,
    /// The instance under construction, whatever `init` returned
    Constructor(Value),
}

/// Call frame for one routine activation
///
/// Locals live in the frame rather than on the value stack, so a suspended
/// generator can carry them away.
///
/// ```text
/// stack:  [caller operands] | [frame operands ...]
///                             ^ stack_base
/// locals: [receiver?][params...][body locals...]
/// ```
#[derive(Debug)]
pub struct CallFrame {
    pub(crate) id: FrameId,
    pub(crate) function: Rc<FunctionDef>,
    /// Unbound slots are `None`
    pub(crate) locals: Vec<Option<Value>>,
    pub(crate) ip: usize,
    /// Offset of the instruction executed last
    pub(crate) last_ip: usize,
    pub(crate) stack_base: usize,
    pub(crate) handlers: Vec<Handler>,
    pub(crate) kind: FrameKind,
    /// Set only while a generator frame is on the frame stack
    pub(crate) generator: Option<Rc<Generator>>,
    /// Operand stack of a suspended generator
    pub(crate) saved_stack: Vec<Value>,
    /// Source line of the instruction executing now
    pub(crate) line: Option<u32>,
    /// Whether the call event already fired once for this frame
    pub(crate) started: bool,
}

impl CallFrame {
    pub(crate) fn new(
        id: FrameId,
        function: Rc<FunctionDef>,
        locals: Vec<Option<Value>>,
        kind: FrameKind,
    ) -> Self {
        Self {
            id,
            function,
            locals,
            ip: 0,
            last_ip: 0,
            stack_base: 0,
            handlers: Vec::new(),
            kind,
            generator: None,
            saved_stack: Vec::new(),
            line: None,
            started: false,
        }
    }

    /// Name of the local in `slot`, for error messages
    pub(crate) fn local_name(&self, slot: usize) -> &str {
        self.function
            .locals
            .get(slot)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }
}
