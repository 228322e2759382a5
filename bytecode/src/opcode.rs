//! OpCode definitions for the Veld VM.
//!
//! This module defines the complete instruction set for the stack machine.
//! Instructions are encoded as 32-bit words with the opcode in the low
//! 8 bits and one of two operand layouts above it:
//!
//! Format C:  [24-bit C][8-bit opcode]        — one wide operand
//! Format AB: [12-bit B][12-bit A][8-bit opcode] — two narrow operands
//!
//! Which layout applies is fixed per opcode. Operand fields are masked
//! against their widths on both encode and decode.

use std::fmt;

/// Reference modes carried in the A operand of [`OpCode::Ref`].
pub const REF_GLOBAL: u32 = 0;
pub const REF_LOCAL: u32 = 1;
pub const REF_OUTER: u32 = 2;
pub const REF_INDEX: u32 = 4;

/// Virtual machine instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// No operation.
    Nop = 0,
    /// Discard the top of stack.
    Pop = 1,
    /// Duplicate the top of stack.
    Dup = 2,

    // ===== Variables =====
    /// Push local slot C.
    LoadLocal = 10,
    /// Store the top of stack into local slot C without popping it.
    StoreLocal = 11,
    /// Push captured outer value C.
    LoadOuter = 12,
    /// Store the top of stack into outer value C without popping it.
    StoreOuter = 13,
    /// Push the global named by constant C.
    LoadGlobal = 14,
    /// Store the top of stack into the global named by constant C.
    StoreGlobal = 15,
    /// Pop key and target, push `target[key]`.
    LoadIndex = 16,
    /// Pop value, key, and target, store `target[key] = value`, push value.
    StoreIndex = 17,

    // ===== Literals =====
    /// Push null.
    NLoad = 20,
    /// Push true.
    BLoadT = 21,
    /// Push false.
    BLoadF = 22,
    ILoadM1 = 23,
    ILoad0 = 24,
    ILoad1 = 25,
    ILoad2 = 26,
    ILoad3 = 27,
    ILoad4 = 28,
    ILoad5 = 29,
    FLoadM1 = 30,
    FLoad0 = 31,
    FLoad1 = 32,
    FLoad2 = 33,
    /// Push constant-pool entry C.
    CLoad = 34,

    // ===== Closures =====
    /// Instantiate nested prototype C as a closure and push it.
    Closure = 40,
    /// Detach live captures of local slots at index >= C.
    CloseOuters = 41,

    // ===== Invocation =====
    /// Pop C arguments and the callee, push the call result.
    Invoke = 45,
    /// Pop C arguments, a method key, and a receiver; push the result.
    InvokeMethod = 46,

    // ===== Flow control (C is an absolute code index) =====
    Jump = 50,
    /// Pop two values, jump to C when equal.
    JumpEq = 51,
    /// Pop two values, jump to C when not equal.
    JumpNeq = 52,
    /// Pop one value, jump to C when truthy.
    JumpTrue = 53,
    /// Pop one value, jump to C when falsey.
    JumpFalse = 54,

    // ===== Operators =====
    /// Pop two values, push their equality as a bool.
    CompEq = 60,
    CompNeq = 61,
    /// Apply the prefix operator named by constant C to the top of stack.
    Prefix = 65,
    /// Pop two values, apply the infix operator named by constant C, push
    /// the result.
    Infix = 66,

    // ===== Aggregates =====
    /// Pop C values, push a list of them.
    List = 70,
    /// Pop C values, push a tuple of them.
    Tuple = 71,

    // ===== Booleans =====
    /// Logical negation of the top of stack, in place.
    Not = 75,
    /// Pop the top; if falsey push it back and jump to C, else fall
    /// through. Exactly one value remains on both paths once the right
    /// operand lands.
    BoolAnd = 76,
    /// Pop the top; if truthy push it back and jump to C, else fall
    /// through.
    BoolOr = 77,

    // ===== References =====
    /// Push a mutable cell. A is the mode (`REF_*`), B the slot/constant
    /// index; mode `REF_INDEX` instead pops a target and key.
    Ref = 80,
    /// Pop a reference cell, push its current value.
    Deref = 81,
}

impl OpCode {
    /// Get opcode from byte value.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(OpCode::Nop),
            1 => Some(OpCode::Pop),
            2 => Some(OpCode::Dup),
            10 => Some(OpCode::LoadLocal),
            11 => Some(OpCode::StoreLocal),
            12 => Some(OpCode::LoadOuter),
            13 => Some(OpCode::StoreOuter),
            14 => Some(OpCode::LoadGlobal),
            15 => Some(OpCode::StoreGlobal),
            16 => Some(OpCode::LoadIndex),
            17 => Some(OpCode::StoreIndex),
            20 => Some(OpCode::NLoad),
            21 => Some(OpCode::BLoadT),
            22 => Some(OpCode::BLoadF),
            23 => Some(OpCode::ILoadM1),
            24 => Some(OpCode::ILoad0),
            25 => Some(OpCode::ILoad1),
            26 => Some(OpCode::ILoad2),
            27 => Some(OpCode::ILoad3),
            28 => Some(OpCode::ILoad4),
            29 => Some(OpCode::ILoad5),
            30 => Some(OpCode::FLoadM1),
            31 => Some(OpCode::FLoad0),
            32 => Some(OpCode::FLoad1),
            33 => Some(OpCode::FLoad2),
            34 => Some(OpCode::CLoad),
            40 => Some(OpCode::Closure),
            41 => Some(OpCode::CloseOuters),
            45 => Some(OpCode::Invoke),
            46 => Some(OpCode::InvokeMethod),
            50 => Some(OpCode::Jump),
            51 => Some(OpCode::JumpEq),
            52 => Some(OpCode::JumpNeq),
            53 => Some(OpCode::JumpTrue),
            54 => Some(OpCode::JumpFalse),
            60 => Some(OpCode::CompEq),
            61 => Some(OpCode::CompNeq),
            65 => Some(OpCode::Prefix),
            66 => Some(OpCode::Infix),
            70 => Some(OpCode::List),
            71 => Some(OpCode::Tuple),
            75 => Some(OpCode::Not),
            76 => Some(OpCode::BoolAnd),
            77 => Some(OpCode::BoolOr),
            80 => Some(OpCode::Ref),
            81 => Some(OpCode::Deref),
            _ => None,
        }
    }

    /// Convert opcode to byte value.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this opcode's C operand is an absolute code index that must
    /// be patched before a prototype is finalized.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::JumpEq
                | OpCode::JumpNeq
                | OpCode::JumpTrue
                | OpCode::JumpFalse
                | OpCode::BoolAnd
                | OpCode::BoolOr
        )
    }

    /// Get human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Nop => "NOP",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::LoadLocal => "LOAD_LOCAL",
            OpCode::StoreLocal => "STORE_LOCAL",
            OpCode::LoadOuter => "LOAD_OUTER",
            OpCode::StoreOuter => "STORE_OUTER",
            OpCode::LoadGlobal => "LOAD_GLOBAL",
            OpCode::StoreGlobal => "STORE_GLOBAL",
            OpCode::LoadIndex => "LOAD_INDEX",
            OpCode::StoreIndex => "STORE_INDEX",
            OpCode::NLoad => "NLOAD",
            OpCode::BLoadT => "BLOAD_T",
            OpCode::BLoadF => "BLOAD_F",
            OpCode::ILoadM1 => "ILOAD_M1",
            OpCode::ILoad0 => "ILOAD_0",
            OpCode::ILoad1 => "ILOAD_1",
            OpCode::ILoad2 => "ILOAD_2",
            OpCode::ILoad3 => "ILOAD_3",
            OpCode::ILoad4 => "ILOAD_4",
            OpCode::ILoad5 => "ILOAD_5",
            OpCode::FLoadM1 => "FLOAD_M1",
            OpCode::FLoad0 => "FLOAD_0",
            OpCode::FLoad1 => "FLOAD_1",
            OpCode::FLoad2 => "FLOAD_2",
            OpCode::CLoad => "CLOAD",
            OpCode::Closure => "CLOSURE",
            OpCode::CloseOuters => "CLOSE_OUTERS",
            OpCode::Invoke => "INVOKE",
            OpCode::InvokeMethod => "INVOKE_METHOD",
            OpCode::Jump => "JUMP",
            OpCode::JumpEq => "JUMP_EQ",
            OpCode::JumpNeq => "JUMP_NEQ",
            OpCode::JumpTrue => "JUMP_TRUE",
            OpCode::JumpFalse => "JUMP_FALSE",
            OpCode::CompEq => "COMP_EQ",
            OpCode::CompNeq => "COMP_NEQ",
            OpCode::Prefix => "PREFIX",
            OpCode::Infix => "INFIX",
            OpCode::List => "LIST",
            OpCode::Tuple => "TUPLE",
            OpCode::Not => "NOT",
            OpCode::BoolAnd => "BOOL_AND",
            OpCode::BoolOr => "BOOL_OR",
            OpCode::Ref => "REF",
            OpCode::Deref => "DEREF",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Instruction encoding/decoding utilities.
pub mod instruction {
    pub const SIZE_OP: u32 = 8;
    pub const SIZE_A: u32 = 12;
    pub const SIZE_B: u32 = 12;
    pub const SIZE_C: u32 = 24;

    pub const POS_A: u32 = SIZE_OP;
    pub const POS_B: u32 = SIZE_OP + SIZE_A;
    pub const POS_C: u32 = SIZE_OP;

    pub const MAX_OP: u32 = (1 << SIZE_OP) - 1;
    pub const MAX_A: u32 = (1 << SIZE_A) - 1;
    pub const MAX_B: u32 = (1 << SIZE_B) - 1;
    pub const MAX_C: u32 = (1 << SIZE_C) - 1;

    /// The C-field value a forward jump carries until it is patched. An
    /// all-ones field is never a valid program counter.
    pub const JUMP_PLACEHOLDER: u32 = MAX_C;

    /// Encode an operand-less instruction.
    #[inline]
    pub fn encode(opcode: u8) -> u32 {
        opcode as u32 & MAX_OP
    }

    /// Encode an instruction in C format.
    #[inline]
    pub fn encode_c(opcode: u8, c: u32) -> u32 {
        (opcode as u32 & MAX_OP) | ((c & MAX_C) << POS_C)
    }

    /// Encode an instruction in AB format.
    #[inline]
    pub fn encode_ab(opcode: u8, a: u32, b: u32) -> u32 {
        (opcode as u32 & MAX_OP) | ((a & MAX_A) << POS_A) | ((b & MAX_B) << POS_B)
    }

    /// Decode instruction opcode.
    #[inline]
    pub fn decode_opcode(insn: u32) -> u8 {
        (insn & MAX_OP) as u8
    }

    /// Decode A operand.
    #[inline]
    pub fn decode_a(insn: u32) -> u32 {
        (insn >> POS_A) & MAX_A
    }

    /// Decode B operand.
    #[inline]
    pub fn decode_b(insn: u32) -> u32 {
        (insn >> POS_B) & MAX_B
    }

    /// Decode C operand.
    #[inline]
    pub fn decode_c(insn: u32) -> u32 {
        (insn >> POS_C) & MAX_C
    }

    /// Replace the C operand of an existing word, keeping its opcode.
    /// This is how forward jumps get their real target.
    #[inline]
    pub fn set_c(insn: u32, c: u32) -> u32 {
        (insn & MAX_OP) | ((c & MAX_C) << POS_C)
    }
}
