//! Trace hook interface
//!
//! The VM calls one installed [`TraceHook`] synchronously at each event
//! boundary, handing it a read-only [`FrameView`] of the executing frame.

use super::frame::{CallFrame, FrameId};
use crate::bytecode::Opcode;
use crate::function::{CallConvention, FunctionDef};
use crate::value::Value;
use std::ops::BitOr;
use std::rc::Rc;
use thiserror::Error;

/// Failures a hook may report back to the VM
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to write trace record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize trace record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for hook callbacks
pub type TraceResult<T> = Result<T, TraceError>;

/// Why a frame is being left, as reported by an instrumented routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// A `Return` instruction executed
    Returned,
    /// A generator suspended at `Yield`
    Yielded,
    /// An exception propagated out of the frame
    Unwound,
}

/// Event delivered to a hook
#[derive(Debug, Clone, Copy)]
pub enum TraceEvent<'a> {
    /// A frame started or resumed executing
    Call,
    /// Execution moved to a new source line
    Line(u32),
    /// An instruction is about to execute
    Instruction { offset: usize, opcode: Opcode },
    /// An exception is propagating through the frame
    Exception(&'a Value),
    /// The frame is being left
    ///
    /// `exit` is `None` for uninstrumented routines; the cause must then be
    /// inferred from the frame's last instruction.
    Return {
        value: &'a Value,
        exit: Option<ExitKind>,
    },
}

impl TraceEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            TraceEvent::Call => EventKind::Call,
            TraceEvent::Line(_) => EventKind::Line,
            TraceEvent::Instruction { .. } => EventKind::Instruction,
            TraceEvent::Exception(_) => EventKind::Exception,
            TraceEvent::Return { .. } => EventKind::Return,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Call,
    Line,
    Instruction,
    Exception,
    Return,
}

/// Set of event kinds a hook subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask(u8);

impl EventMask {
    pub const NONE: EventMask = EventMask(0);
    pub const CALL: EventMask = EventMask(1);
    pub const LINE: EventMask = EventMask(1 << 1);
    pub const INSTRUCTION: EventMask = EventMask(1 << 2);
    pub const EXCEPTION: EventMask = EventMask(1 << 3);
    pub const RETURN: EventMask = EventMask(1 << 4);
    pub const ALL: EventMask = EventMask(0b1_1111);

    pub fn contains(self, kind: EventKind) -> bool {
        self.0 & EventMask::from(kind).0 != 0
    }
}

impl From<EventKind> for EventMask {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Call => EventMask::CALL,
            EventKind::Line => EventMask::LINE,
            EventKind::Instruction => EventMask::INSTRUCTION,
            EventKind::Exception => EventMask::EXCEPTION,
            EventKind::Return => EventMask::RETURN,
        }
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        EventMask(self.0 | rhs.0)
    }
}

/// Callback invoked by the VM at event boundaries
///
/// An error aborts execution with [`crate::RuntimeError::Hook`].
pub trait TraceHook {
    /// Event kinds the VM should deliver; others are never fired
    fn interests(&self) -> EventMask {
        EventMask::ALL
    }

    fn on_event(&mut self, frame: &FrameView<'_>, event: TraceEvent<'_>) -> TraceResult<()>;
}

/// Read-only view of the executing frame
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    frame: &'a CallFrame,
}

impl<'a> FrameView<'a> {
    pub(crate) fn new(frame: &'a CallFrame) -> Self {
        Self { frame }
    }

    pub fn id(&self) -> FrameId {
        self.frame.id
    }

    /// Routine name
    pub fn name(&self) -> &'a str {
        &self.frame.function.name
    }

    pub fn function(&self) -> &'a Rc<FunctionDef> {
        &self.frame.function
    }

    pub fn convention(&self) -> CallConvention {
        self.frame.function.convention
    }

    /// Bound receiver, for routines whose convention has one
    pub fn receiver(&self) -> Option<&'a Value> {
        if self.convention().has_receiver() {
            self.frame.locals.first().and_then(Option::as_ref)
        } else {
            None
        }
    }

    /// Declared parameters with their current bindings, in order
    pub fn arguments(&self) -> impl Iterator<Item = (&'a str, Option<&'a Value>)> + 'a {
        let frame = self.frame;
        let function = &frame.function;
        let locals = &frame.locals;
        let first = function.first_param_slot();
        function.params.iter().enumerate().map(move |(i, param)| {
            let value = locals.get(first + i).and_then(Option::as_ref);
            (param.name.as_str(), value)
        })
    }

    /// Current binding of a named local
    pub fn local(&self, name: &str) -> Option<&'a Value> {
        let slot = self.frame.function.slot_of(name)?;
        self.frame.locals.get(slot).and_then(Option::as_ref)
    }

    pub fn source_file(&self) -> &'a str {
        &self.frame.function.source_file
    }

    /// Line executing now; the definition line before the first instruction
    pub fn line(&self) -> u32 {
        self.frame.line.unwrap_or(self.frame.function.first_line)
    }

    /// Compiled instruction bytes of the routine
    pub fn code(&self) -> &'a [u8] {
        &self.frame.function.chunk.code
    }

    /// Offset of the instruction executed last
    pub fn last_offset(&self) -> usize {
        self.frame.last_ip
    }
}
