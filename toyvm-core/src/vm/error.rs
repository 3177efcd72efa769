//! Errors of the ToyVM
//!
//! One enum per failure class: program construction ([`EncodingError`]),
//! control flow at run time ([`ProgramError`]) and native code generation
//! ([`CodegenError`]). All of them are fatal for the operation that raised
//! them.

use thiserror::Error;

/// Result type of the VM
pub type VmResult<T> = Result<T, VmError>;

/// An operand does not fit its instruction field, or a raw word is not a
/// valid instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// Immediate or memory index wider than 16 bits
    #[error("{operation}: operand {value} does not fit in 16 bits")]
    ImmediateOutOfRange { operation: &'static str, value: u32 },

    /// Branch displacement outside the signed 16-bit range
    #[error("branch offset {offset} does not fit in a signed 16-bit field")]
    BranchOffsetOutOfRange { offset: i32 },

    /// Opcode byte outside the defined set
    #[error("invalid opcode 0x{opcode:02X} in word 0x{word:08X}")]
    InvalidOpcode { word: u32, opcode: u8 },

    /// Register byte other than A (0) or B (1)
    #[error("invalid register {register} in word 0x{word:08X}")]
    InvalidRegister { word: u32, register: u8 },
}

/// Control flow left the program other than by reaching its end.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("jump at pc {pc} targets {target}, outside 0..={len}")]
    JumpOutOfRange { pc: usize, target: i64, len: usize },
}

/// Native code generation failed.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// The program buffer holds a word that does not decode
    #[error("cannot compile word 0x{word:08X} at pc {pc}")]
    InvalidInstruction { pc: usize, word: u32 },

    /// More cached cells requested than host registers reserved for them
    #[error("{requested} cached cells requested, the backend supports at most {max}")]
    TooManyCachedCells { requested: usize, max: usize },

    /// The assembler could not allocate its buffer
    #[error("assembler initialization failed: {0}")]
    Assembler(#[source] std::io::Error),

    /// The code buffer could not be made executable
    #[error("failed to finalize executable buffer")]
    Finalize,

    /// No native backend for this host
    #[error("no JIT backend for target architecture {0}")]
    UnsupportedHost(&'static str),
}

/// Any VM failure
#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    /// The PRINT output sink failed
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}
