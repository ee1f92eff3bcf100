//! Bytecode disassembler
//!
//! Converts a chunk back to a human-readable listing. Used by the exit
//! classifier's debug logging and by tests.

use super::{Chunk, Opcode};
use std::fmt::Write;

/// Disassemble a chunk to human-readable format
///
/// # Format
/// ```text
/// === Constants ===
/// 0: 42
/// 1: hello
///
/// === Instructions ===
/// 0000     3  Constant 0
/// 0003     |  Return
/// ```
pub fn disassemble(chunk: &Chunk) -> String {
    let mut output = String::new();

    if !chunk.constants.is_empty() {
        let _ = writeln!(output, "=== Constants ===");
        for (idx, constant) in chunk.constants.iter().enumerate() {
            let _ = writeln!(output, "{}: {}", idx, constant);
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "=== Instructions ===");
    let mut offset = 0;
    let mut previous_line = None;
    while offset < chunk.code.len() {
        let line = chunk.line_at(offset);
        let line_column = if line == previous_line {
            "    |".to_string()
        } else {
            line.map(|l| format!("{:5}", l)).unwrap_or_else(|| "    ?".to_string())
        };
        previous_line = line;

        let start = offset;
        let text = disassemble_instruction(chunk, &mut offset);
        let _ = writeln!(output, "{:04} {}  {}", start, line_column, text);
    }

    output
}

/// Disassemble the single instruction starting at `offset`
pub fn instruction_at(chunk: &Chunk, offset: usize) -> String {
    let mut cursor = offset;
    disassemble_instruction(chunk, &mut cursor)
}

/// Disassemble a single instruction at the given offset
///
/// Advances offset past the instruction and its operands.
fn disassemble_instruction(chunk: &Chunk, offset: &mut usize) -> String {
    let Some(&byte) = chunk.code.get(*offset) else {
        return "<invalid offset>".to_string();
    };
    *offset += 1;

    let opcode = match Opcode::try_from(byte) {
        Ok(op) => op,
        Err(_) => return format!("<invalid opcode: {:#04x}>", byte),
    };

    match opcode {
        Opcode::Constant => {
            let index = read_u16(chunk, offset);
            match chunk.constants.get(index as usize) {
                Some(value) => format!("{:?} {} ({})", opcode, index, value),
                None => format!("{:?} {} <out of range>", opcode, index),
            }
        }

        Opcode::GetGlobal | Opcode::SetGlobal | Opcode::GetAttr | Opcode::SetAttr => {
            let index = read_u16(chunk, offset);
            let name = chunk
                .constants
                .get(index as usize)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string());
            format!("{:?} {} ({})", opcode, index, name)
        }

        Opcode::GetLocal | Opcode::SetLocal => {
            let index = read_u16(chunk, offset);
            format!("{:?} {}", opcode, index)
        }

        Opcode::Jump | Opcode::JumpIfFalse | Opcode::PushHandler => {
            let jump = read_u16(chunk, offset) as i16;
            let target = (*offset as isize + jump as isize).max(0);
            format!("{:?} {} (-> {:04})", opcode, jump, target)
        }

        Opcode::Loop => {
            let distance = read_u16(chunk, offset);
            let target = offset.saturating_sub(distance as usize);
            format!("{:?} {} (-> {:04})", opcode, distance, target)
        }

        Opcode::Call => {
            let argc = read_u8(chunk, offset);
            format!("{:?} {}", opcode, argc)
        }

        Opcode::Invoke => {
            let index = read_u16(chunk, offset);
            let argc = read_u8(chunk, offset);
            let name = chunk
                .constants
                .get(index as usize)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string());
            format!("{:?} {} ({}) {}", opcode, index, name, argc)
        }

        _ => format!("{:?}", opcode),
    }
}

fn read_u8(chunk: &Chunk, offset: &mut usize) -> u8 {
    let byte = chunk.code.get(*offset).copied().unwrap_or(0);
    *offset += 1;
    byte
}

fn read_u16(chunk: &Chunk, offset: &mut usize) -> u16 {
    let value = chunk.read_u16(*offset).unwrap_or(0);
    *offset += 2;
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_disassemble_listing() {
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::Number(42.0));
        chunk.emit(Opcode::Constant, 3);
        chunk.emit_u16(idx);
        chunk.emit(Opcode::Return, 3);

        let listing = disassemble(&chunk);
        assert!(listing.contains("=== Constants ===\n0: 42\n"));
        assert!(listing.contains("0000     3  Constant 0 (42)"));
        assert!(listing.contains("0003     |  Return"));
    }

    #[test]
    fn test_instruction_at_invalid_opcode() {
        let mut chunk = Chunk::new();
        chunk.emit_u8(0xEE);
        assert_eq!(instruction_at(&chunk, 0), "<invalid opcode: 0xee>");
        assert_eq!(instruction_at(&chunk, 5), "<invalid offset>");
    }

    #[test]
    fn test_jump_targets() {
        let mut chunk = Chunk::new();
        let operand = chunk.emit_jump(Opcode::Jump, 1);
        chunk.emit(Opcode::Pop, 1);
        chunk.patch_jump(operand);
        chunk.emit_loop(0, 1);

        assert_eq!(instruction_at(&chunk, 0), "Jump 1 (-> 0004)");
        assert_eq!(instruction_at(&chunk, 4), "Loop 7 (-> 0000)");
    }
}
