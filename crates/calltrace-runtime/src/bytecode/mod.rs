//! Compiled instruction streams
//!
//! Every routine owns one [`Chunk`]: raw instruction bytes, a constant pool
//! and a line table used for call-site locations.

pub mod disasm;
mod opcode;

pub use opcode::{operand_size, Opcode};

use crate::value::Value;

/// Line table entry
///
/// Records the source line of every instruction emitted from `instruction_offset`
/// until the next entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    /// Byte offset of the first instruction on this line
    pub instruction_offset: usize,
    /// Source line number (1-based)
    pub line: u32,
}

/// Bytecode container for a single routine
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Raw instruction bytes
    pub code: Vec<u8>,
    /// Constant pool (referenced by index)
    pub constants: Vec<Value>,
    /// Line table, ordered by offset
    pub lines: Vec<LineEntry>,
}

impl Chunk {
    /// Create a new empty chunk
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an opcode attributed to a source line
    pub fn emit(&mut self, opcode: Opcode, line: u32) {
        if self.lines.last().map(|entry| entry.line) != Some(line) {
            self.lines.push(LineEntry {
                instruction_offset: self.code.len(),
                line,
            });
        }
        self.code.push(opcode as u8);
    }

    /// Emit a single byte operand
    pub fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Emit a u16 operand (big-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.code.push((value >> 8) as u8);
        self.code.push((value & 0xFF) as u8);
    }

    /// Emit an i16 operand (big-endian, signed)
    pub fn emit_i16(&mut self, value: i16) {
        self.emit_u16(value as u16);
    }

    /// Add a constant to the pool and return its index
    ///
    /// Identical string constants are shared.
    ///
    /// # Panics
    ///
    /// Panics if the pool would outgrow the u16 operand.
    pub fn add_constant(&mut self, value: Value) -> u16 {
        if let Value::Str(s) = &value {
            let existing = self
                .constants
                .iter()
                .position(|c| matches!(c, Value::Str(other) if other == s));
            if let Some(index) = existing {
                return index as u16;
            }
        }
        let index = self.constants.len();
        assert!(
            index <= u16::MAX as usize,
            "constant pool is limited to {} entries",
            u16::MAX as usize + 1
        );
        self.constants.push(value);
        index as u16
    }

    /// Get current instruction offset (for jump targets)
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Emit a forward jump with a placeholder operand
    ///
    /// Returns the operand offset to hand to [`Chunk::patch_jump`].
    pub fn emit_jump(&mut self, opcode: Opcode, line: u32) -> usize {
        self.emit(opcode, line);
        let operand = self.code.len();
        self.emit_u16(0xFFFF);
        operand
    }

    /// Patch a forward jump so it lands on the current offset
    ///
    /// # Panics
    ///
    /// Panics if the distance does not fit the i16 operand.
    pub fn patch_jump(&mut self, operand: usize) {
        let distance = self.code.len() - operand - 2;
        assert!(
            distance <= i16::MAX as usize,
            "jump of {} bytes does not fit an i16 operand",
            distance
        );
        let jump = distance as i16;
        self.code[operand] = ((jump >> 8) & 0xFF) as u8;
        self.code[operand + 1] = (jump & 0xFF) as u8;
    }

    /// Emit a backward jump to `loop_start`
    ///
    /// # Panics
    ///
    /// Panics if the distance does not fit the u16 operand.
    pub fn emit_loop(&mut self, loop_start: usize, line: u32) {
        self.emit(Opcode::Loop, line);
        // Distance from the end of this instruction back to the target
        let distance = self.code.len() + 2 - loop_start;
        assert!(
            distance <= u16::MAX as usize,
            "loop of {} bytes does not fit a u16 operand",
            distance
        );
        self.emit_u16(distance as u16);
    }

    /// Source line of the instruction at `offset`
    pub fn line_at(&self, offset: usize) -> Option<u32> {
        self.lines
            .iter()
            .take_while(|entry| entry.instruction_offset <= offset)
            .last()
            .map(|entry| entry.line)
    }

    /// Read a big-endian u16 operand at `offset`
    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let hi = *self.code.get(offset)? as u16;
        let lo = *self.code.get(offset + 1)? as u16;
        Some((hi << 8) | lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_to_u8() {
        assert_eq!(Opcode::Constant as u8, 0x01);
        assert_eq!(Opcode::Return as u8, 0x61);
        assert_eq!(Opcode::Yield as u8, 0x63);
        assert_eq!(Opcode::Raise as u8, 0x90);
    }

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::try_from(0x01), Ok(Opcode::Constant));
        assert_eq!(Opcode::try_from(0x61), Ok(Opcode::Return));
        assert_eq!(Opcode::try_from(0x92), Ok(Opcode::PopHandler));
        assert_eq!(Opcode::try_from(0xEE), Err(()));
    }

    #[test]
    fn test_line_table_only_records_changes() {
        let mut chunk = Chunk::new();
        chunk.emit(Opcode::PushNone, 3);
        chunk.emit(Opcode::Pop, 3);
        chunk.emit(Opcode::PushNone, 4);
        chunk.emit(Opcode::Return, 4);

        assert_eq!(chunk.lines.len(), 2);
        assert_eq!(chunk.line_at(0), Some(3));
        assert_eq!(chunk.line_at(1), Some(3));
        assert_eq!(chunk.line_at(3), Some(4));
        assert_eq!(Chunk::new().line_at(0), None);
    }

    #[test]
    fn test_patch_jump_targets_current_offset() {
        let mut chunk = Chunk::new();
        let operand = chunk.emit_jump(Opcode::Jump, 1);
        chunk.emit(Opcode::PushNone, 1);
        chunk.emit(Opcode::Pop, 1);
        chunk.patch_jump(operand);

        // Jump skips the two single-byte instructions
        assert_eq!(chunk.read_u16(operand), Some(2));
    }

    #[test]
    fn test_string_constants_are_shared() {
        let mut chunk = Chunk::new();
        let a = chunk.add_constant(Value::from("name"));
        let b = chunk.add_constant(Value::Number(1.0));
        let c = chunk.add_constant(Value::from("name"));

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(chunk.constants.len(), 2);
    }

    #[test]
    fn test_constant_pool_fills_the_u16_range() {
        let mut chunk = Chunk::new();
        for i in 0..=u16::MAX {
            assert_eq!(chunk.add_constant(Value::Number(i as f64)), i);
        }
    }

    #[test]
    #[should_panic(expected = "constant pool is limited")]
    fn test_constant_pool_overflow_panics() {
        let mut chunk = Chunk::new();
        for i in 0..=u16::MAX as usize + 1 {
            chunk.add_constant(Value::Number(i as f64));
        }
    }

    #[test]
    #[should_panic(expected = "does not fit an i16 operand")]
    fn test_oversized_forward_jump_panics() {
        let mut chunk = Chunk::new();
        let operand = chunk.emit_jump(Opcode::Jump, 1);
        for _ in 0..40_000 {
            chunk.emit_u8(Opcode::PushNone as u8);
        }
        chunk.patch_jump(operand);
    }

    #[test]
    #[should_panic(expected = "does not fit a u16 operand")]
    fn test_oversized_loop_panics() {
        let mut chunk = Chunk::new();
        for _ in 0..70_000 {
            chunk.emit_u8(Opcode::PushNone as u8);
        }
        chunk.emit_loop(0, 1);
    }
}
