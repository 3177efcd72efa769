//! Instructions of the ToyVM
//!
//! Every instruction is one 32-bit word:
//!
//! ```text
//!  31      24 23      16 15                0
//! ┌──────────┬──────────┬──────────────────┐
//! │  opcode  │ register │    immediate     │
//! └──────────┴──────────┴──────────────────┘
//! ```
//!
//! The immediate is stored as a raw 16-bit pattern. Only `vjnz` reads it
//! as signed, and only when it is consumed.

use super::error::EncodingError;
use super::opcode::{Opcode, OperandKind};

/// Virtual register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    A = 0,
    B = 1,
}

impl Register {
    /// Both registers, by index
    pub const ALL: [Register; 2] = [Self::A, Self::B];

    /// Decodes register from byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::A),
            1 => Some(Self::B),
            _ => None,
        }
    }

    /// Index into the register file
    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    /// ASCII letter printed by `vput`
    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Packs the three fields into an instruction word
#[inline]
pub const fn encode(opcode: Opcode, register: Register, immediate: u16) -> u32 {
    ((opcode as u32) << 24) | ((register as u32) << 16) | immediate as u32
}

/// Extracts the three fields of an instruction word
#[inline]
pub fn decode(word: u32) -> Result<Instruction, EncodingError> {
    let opcode_byte = (word >> 24) as u8;
    let register_byte = (word >> 16) as u8;

    let opcode = Opcode::from_byte(opcode_byte).ok_or(EncodingError::InvalidOpcode {
        word,
        opcode: opcode_byte,
    })?;
    let register = Register::from_byte(register_byte).ok_or(EncodingError::InvalidRegister {
        word,
        register: register_byte,
    })?;

    Ok(Instruction {
        opcode,
        register,
        immediate: word as u16,
    })
}

/// Decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub register: Register,
    /// Raw 16-bit field
    pub immediate: u16,
}

impl Instruction {
    /// Creates instruction
    pub fn new(opcode: Opcode, register: Register, immediate: u16) -> Self {
        Self { opcode, register, immediate }
    }

    /// Encoded word
    pub fn encode(&self) -> u32 {
        encode(self.opcode, self.register, self.immediate)
    }

    /// Immediate reinterpreted as a signed branch displacement
    #[inline(always)]
    pub fn branch_offset(&self) -> i16 {
        self.immediate as i16
    }

    /// Instruction index a taken `vjnz` at `pc` lands on
    ///
    /// May be negative or past the end; callers decide whether that is legal.
    #[inline(always)]
    pub fn branch_target(&self, pc: usize) -> i64 {
        pc as i64 + 1 + i64::from(self.branch_offset())
    }

    /// Disassembly
    pub fn disassemble(&self) -> String {
        let mnemonic = self.opcode.mnemonic();
        match self.opcode.operand_kind() {
            OperandKind::Immediate => format!("{} {}, {}", mnemonic, self.register, self.immediate),
            OperandKind::Memory => format!("{} {}, [{}]", mnemonic, self.register, self.immediate),
            OperandKind::Branch => format!("{} {}, {}", mnemonic, self.register, self.branch_offset()),
            OperandKind::None => format!("{} {}", mnemonic, self.register),
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.disassemble())
    }
}
