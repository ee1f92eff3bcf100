//! Bytecode instruction set
//!
//! Stack-based bytecode organized by category.
//! Operands are encoded inline after the opcode byte, big-endian.

/// Bytecode opcode
///
/// Explicit byte values keep the encoding stable; the exit classifier
/// compares raw bytes against [`Opcode::Return`] and [`Opcode::Yield`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Constants (0x01-0x0F) =====
    /// Push constant from pool [u16 index]
    Constant = 0x01,
    /// Push None
    PushNone = 0x02,
    /// Push True
    True = 0x03,
    /// Push False
    False = 0x04,

    // ===== Variables (0x10-0x1F) =====
    /// Load local slot [u16 index]
    GetLocal = 0x10,
    /// Pop into local slot [u16 index]
    SetLocal = 0x11,
    /// Load global by name [u16 name constant]
    GetGlobal = 0x12,
    /// Pop into global [u16 name constant]
    SetGlobal = 0x13,

    // ===== Arithmetic (0x20-0x2F) =====
    /// Pop b, pop a, push a + b (numbers or strings)
    Add = 0x20,
    /// Pop b, pop a, push a - b
    Sub = 0x21,
    /// Pop b, pop a, push a * b
    Mul = 0x22,
    /// Pop b, pop a, push a / b; raises ZeroDivisionError on b == 0
    Div = 0x23,
    /// Pop b, pop a, push a % b; raises ZeroDivisionError on b == 0
    Mod = 0x24,
    /// Pop a, push -a
    Negate = 0x25,

    // ===== Comparison (0x30-0x3F) =====
    Equal = 0x30,
    NotEqual = 0x31,
    Less = 0x32,
    LessEqual = 0x33,
    Greater = 0x34,
    GreaterEqual = 0x35,

    // ===== Logical (0x40-0x4F) =====
    /// Pop a, push !truthy(a)
    Not = 0x40,

    // ===== Control flow (0x50-0x5F) =====
    /// Unconditional forward jump [i16 offset]
    Jump = 0x50,
    /// Pop condition, jump if falsy [i16 offset]
    JumpIfFalse = 0x51,
    /// Jump backward [u16 offset]
    Loop = 0x52,

    // ===== Routines (0x60-0x6F) =====
    /// Call callee below the arguments [u8 arg_count]
    Call = 0x60,
    /// Return top of stack from the current frame
    Return = 0x61,
    /// Call a method on the receiver below the arguments [u16 name constant, u8 arg_count]
    Invoke = 0x62,
    /// Suspend the current generator frame, handing top of stack to the resumer
    Yield = 0x63,
    /// Pop a generator and resume it
    Next = 0x64,

    // ===== Objects (0x70-0x7F) =====
    /// Pop object, push field [u16 name constant]
    GetAttr = 0x70,
    /// Pop value, pop object, set field [u16 name constant]
    SetAttr = 0x71,

    // ===== Stack manipulation (0x80-0x8F) =====
    /// Pop and discard top of stack
    Pop = 0x80,
    /// Duplicate top of stack
    Dup = 0x81,

    // ===== Exceptions (0x90-0x9F) =====
    /// Pop a value and raise it
    Raise = 0x90,
    /// Install a handler for the current frame [i16 offset to handler]
    PushHandler = 0x91,
    /// Remove the innermost handler of the current frame
    PopHandler = 0x92,
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Opcode::Constant),
            0x02 => Ok(Opcode::PushNone),
            0x03 => Ok(Opcode::True),
            0x04 => Ok(Opcode::False),
            0x10 => Ok(Opcode::GetLocal),
            0x11 => Ok(Opcode::SetLocal),
            0x12 => Ok(Opcode::GetGlobal),
            0x13 => Ok(Opcode::SetGlobal),
            0x20 => Ok(Opcode::Add),
            0x21 => Ok(Opcode::Sub),
            0x22 => Ok(Opcode::Mul),
            0x23 => Ok(Opcode::Div),
            0x24 => Ok(Opcode::Mod),
            0x25 => Ok(Opcode::Negate),
            0x30 => Ok(Opcode::Equal),
            0x31 => Ok(Opcode::NotEqual),
            0x32 => Ok(Opcode::Less),
            0x33 => Ok(Opcode::LessEqual),
            0x34 => Ok(Opcode::Greater),
            0x35 => Ok(Opcode::GreaterEqual),
            0x40 => Ok(Opcode::Not),
            0x50 => Ok(Opcode::Jump),
            0x51 => Ok(Opcode::JumpIfFalse),
            0x52 => Ok(Opcode::Loop),
            0x60 => Ok(Opcode::Call),
            0x61 => Ok(Opcode::Return),
            0x62 => Ok(Opcode::Invoke),
            0x63 => Ok(Opcode::Yield),
            0x64 => Ok(Opcode::Next),
            0x70 => Ok(Opcode::GetAttr),
            0x71 => Ok(Opcode::SetAttr),
            0x80 => Ok(Opcode::Pop),
            0x81 => Ok(Opcode::Dup),
            0x90 => Ok(Opcode::Raise),
            0x91 => Ok(Opcode::PushHandler),
            0x92 => Ok(Opcode::PopHandler),
            _ => Err(()),
        }
    }
}

/// Returns the number of operand bytes following an opcode.
pub fn operand_size(opcode: Opcode) -> usize {
    match opcode {
        // u16 operand
        Opcode::Constant
        | Opcode::GetLocal
        | Opcode::SetLocal
        | Opcode::GetGlobal
        | Opcode::SetGlobal
        | Opcode::GetAttr
        | Opcode::SetAttr
        | Opcode::Loop => 2,
        // i16 operand
        Opcode::Jump | Opcode::JumpIfFalse | Opcode::PushHandler => 2,
        // u8 operand
        Opcode::Call => 1,
        // u16 name + u8 arg count
        Opcode::Invoke => 3,
        // No operand
        _ => 0,
    }
}
