//! Instruction decoding for the VM
//!
//! Uses a static lookup table so the hot loop decodes an opcode byte with a
//! single index instead of a match.

use crate::bytecode::Opcode;

/// Static dispatch table mapping byte values to optional Opcodes.
static OPCODE_TABLE: [Option<Opcode>; 256] = {
    let mut table: [Option<Opcode>; 256] = [None; 256];

    // Constants (0x01-0x04)
    table[0x01] = Some(Opcode::Constant);
    table[0x02] = Some(Opcode::PushNone);
    table[0x03] = Some(Opcode::True);
    table[0x04] = Some(Opcode::False);

    // Variables (0x10-0x13)
    table[0x10] = Some(Opcode::GetLocal);
    table[0x11] = Some(Opcode::SetLocal);
    table[0x12] = Some(Opcode::GetGlobal);
    table[0x13] = Some(Opcode::SetGlobal);

    // Arithmetic (0x20-0x25)
    table[0x20] = Some(Opcode::Add);
    table[0x21] = Some(Opcode::Sub);
    table[0x22] = Some(Opcode::Mul);
    table[0x23] = Some(Opcode::Div);
    table[0x24] = Some(Opcode::Mod);
    table[0x25] = Some(Opcode::Negate);

    // Comparison (0x30-0x35)
    table[0x30] = Some(Opcode::Equal);
    table[0x31] = Some(Opcode::NotEqual);
    table[0x32] = Some(Opcode::Less);
    table[0x33] = Some(Opcode::LessEqual);
    table[0x34] = Some(Opcode::Greater);
    table[0x35] = Some(Opcode::GreaterEqual);

    // Logical
    table[0x40] = Some(Opcode::Not);

    // Control flow (0x50-0x52)
    table[0x50] = Some(Opcode::Jump);
    table[0x51] = Some(Opcode::JumpIfFalse);
    table[0x52] = Some(Opcode::Loop);

    // Routines (0x60-0x64)
    table[0x60] = Some(Opcode::Call);
    table[0x61] = Some(Opcode::Return);
    table[0x62] = Some(Opcode::Invoke);
    table[0x63] = Some(Opcode::Yield);
    table[0x64] = Some(Opcode::Next);

    // Objects (0x70-0x71)
    table[0x70] = Some(Opcode::GetAttr);
    table[0x71] = Some(Opcode::SetAttr);

    // Stack manipulation (0x80-0x81)
    table[0x80] = Some(Opcode::Pop);
    table[0x81] = Some(Opcode::Dup);

    // Exceptions (0x90-0x92)
    table[0x90] = Some(Opcode::Raise);
    table[0x91] = Some(Opcode::PushHandler);
    table[0x92] = Some(Opcode::PopHandler);

    table
};

/// Decode an opcode byte using the static lookup table.
/// Returns None for invalid opcode bytes.
#[inline(always)]
pub fn decode_opcode(byte: u8) -> Option<Opcode> {
    OPCODE_TABLE[byte as usize]
}
