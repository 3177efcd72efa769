//! Opcodes of the ToyVM
//!
//! Nine instructions, all of the form `op R, imm16`.

/// Operand class of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Immediate value (`vldi`, `vaddi`, `vsubi`)
    Immediate,
    /// Memory cell index (`vld`, `vst`, `vadd`, `vsub`)
    Memory,
    /// Signed branch displacement (`vjnz`)
    Branch,
    /// Register only (`vput`)
    None,
}

/// Opcodes of the ToyVM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// R = mem[idx]
    LoadMemory = 0x00,
    /// R = imm
    LoadImmediate = 0x01,
    /// mem[idx] = R
    StoreMemory = 0x02,
    /// R += mem[idx]
    AddMemory = 0x03,
    /// R += imm
    AddImmediate = 0x04,
    /// R -= mem[idx]
    SubtractMemory = 0x05,
    /// R -= imm
    SubtractImmediate = 0x06,
    /// Print R
    Print = 0x07,
    /// if R != 0 { pc += offset }
    JumpIfNonZero = 0x08,
}

impl Opcode {
    /// Every opcode, in byte order
    pub const ALL: [Opcode; 9] = [
        Self::LoadMemory,
        Self::LoadImmediate,
        Self::StoreMemory,
        Self::AddMemory,
        Self::AddImmediate,
        Self::SubtractMemory,
        Self::SubtractImmediate,
        Self::Print,
        Self::JumpIfNonZero,
    ];

    /// Decodes opcode from byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::LoadMemory,
            0x01 => Self::LoadImmediate,
            0x02 => Self::StoreMemory,
            0x03 => Self::AddMemory,
            0x04 => Self::AddImmediate,
            0x05 => Self::SubtractMemory,
            0x06 => Self::SubtractImmediate,
            0x07 => Self::Print,
            0x08 => Self::JumpIfNonZero,
            _ => return None,
        })
    }

    /// How the 16-bit field is interpreted
    pub fn operand_kind(&self) -> OperandKind {
        match self {
            Self::LoadImmediate | Self::AddImmediate | Self::SubtractImmediate => {
                OperandKind::Immediate
            }
            Self::LoadMemory | Self::StoreMemory | Self::AddMemory | Self::SubtractMemory => {
                OperandKind::Memory
            }
            Self::JumpIfNonZero => OperandKind::Branch,
            Self::Print => OperandKind::None,
        }
    }

    /// Assembly mnemonic
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::LoadMemory => "vld",
            Self::LoadImmediate => "vldi",
            Self::StoreMemory => "vst",
            Self::AddMemory => "vadd",
            Self::AddImmediate => "vaddi",
            Self::SubtractMemory => "vsub",
            Self::SubtractImmediate => "vsubi",
            Self::Print => "vput",
            Self::JumpIfNonZero => "vjnz",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..=255u8 {
            if let Some(op) = Opcode::from_byte(byte) {
                assert_eq!(op as u8, byte);
            }
        }
        assert_eq!(Opcode::from_byte(0x09), None);
    }

    #[test]
    fn test_all_is_byte_ordered() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
        }
    }

    #[test]
    fn test_operand_kinds() {
        assert_eq!(Opcode::LoadImmediate.operand_kind(), OperandKind::Immediate);
        assert_eq!(Opcode::SubtractMemory.operand_kind(), OperandKind::Memory);
        assert_eq!(Opcode::JumpIfNonZero.operand_kind(), OperandKind::Branch);
        assert_eq!(Opcode::Print.operand_kind(), OperandKind::None);
    }
}
