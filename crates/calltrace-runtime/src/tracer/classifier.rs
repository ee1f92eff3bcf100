//! Return-versus-unwind classification
//!
//! A return event alone does not say why control left a frame. Instrumented
//! routines report it; for the rest the byte at the frame's last executed
//! offset decides. Only `Return` and `Yield` complete a frame, so any other
//! instruction there means an exception propagated out of it.
//!
//! The fallback is tied to this engine's opcode encoding.

use crate::bytecode::{disasm, Opcode};
use crate::vm::{ExitKind, FrameView};
use calltrace_config::ClassifierPolicy;
use tracing::debug;

/// Opcode bytes that leave a frame normally
pub const COMPLETION_OPCODES: [u8; 2] = [Opcode::Return as u8, Opcode::Yield as u8];

/// How a frame was left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Genuine return, or suspension at a yield
    Completed,
    /// An exception propagated through the frame
    Unwound,
}

/// Classify an exit from the instruction at `offset`
///
/// An offset outside the code classifies as an unwind.
pub fn classify_exit(code: &[u8], offset: usize) -> ExitOutcome {
    match code.get(offset) {
        Some(byte) if COMPLETION_OPCODES.contains(byte) => ExitOutcome::Completed,
        _ => ExitOutcome::Unwound,
    }
}

/// Decide the outcome of a return event
pub fn resolve_outcome(
    frame: &FrameView<'_>,
    exit: Option<ExitKind>,
    policy: ClassifierPolicy,
) -> ExitOutcome {
    if let (ClassifierPolicy::Cooperative, Some(exit)) = (policy, exit) {
        return match exit {
            ExitKind::Returned | ExitKind::Yielded => ExitOutcome::Completed,
            ExitKind::Unwound => ExitOutcome::Unwound,
        };
    }

    let offset = frame.last_offset();
    let outcome = classify_exit(frame.code(), offset);
    debug!(
        frame = %frame.id(),
        function = frame.name(),
        offset,
        instruction = %disasm::instruction_at(&frame.function().chunk, offset),
        ?outcome,
        "classified exit by instruction"
    );
    outcome
}
