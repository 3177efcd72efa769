//! Program buffer
//!
//! Append-only sequence of instruction words with a single mark used to
//! compute backward-branch displacements while emitting.
//!
//! ```
//! use toyvm_core::vm::{Program, Register::*};
//!
//! let mut p = Program::new();
//! p.load_immediate(B, 3)?;
//! p.set_mark();
//! p.subtract_immediate(B, 1)?;
//! p.jump_if_non_zero(B, p.mark_offset())?;
//! p.print(B);
//! assert_eq!(p.len(), 4);
//! # Ok::<(), toyvm_core::vm::EncodingError>(())
//! ```

use super::error::{EncodingError, VmResult};
use super::instruction::{decode, encode, Instruction, Register};
use super::interpreter::Interpreter;
use super::opcode::Opcode;
use super::state::VmState;
use crate::config::VmConfig;

/// Encoded program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    code: Vec<u32>,
    mark: usize,
}

impl Program {
    /// Creates an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads raw instruction words, rejecting any that do not decode
    pub fn from_words(words: Vec<u32>) -> Result<Self, EncodingError> {
        for &word in &words {
            decode(word)?;
        }
        Ok(Self { code: words, mark: 0 })
    }

    // ═════════════════════════════════════════════════════════════════
    // EMISSION
    // ═════════════════════════════════════════════════════════════════

    /// `vldi R, imm`: R = imm
    pub fn load_immediate(&mut self, reg: Register, value: u32) -> Result<&mut Self, EncodingError> {
        self.emit(Opcode::LoadImmediate, reg, value)
    }

    /// `vld R, idx`: R = mem[idx]
    pub fn load(&mut self, reg: Register, index: u32) -> Result<&mut Self, EncodingError> {
        self.emit(Opcode::LoadMemory, reg, index)
    }

    /// `vst R, idx`: mem[idx] = R
    pub fn store(&mut self, reg: Register, index: u32) -> Result<&mut Self, EncodingError> {
        self.emit(Opcode::StoreMemory, reg, index)
    }

    /// `vaddi R, imm`: R += imm
    pub fn add_immediate(&mut self, reg: Register, value: u32) -> Result<&mut Self, EncodingError> {
        self.emit(Opcode::AddImmediate, reg, value)
    }

    /// `vadd R, idx`: R += mem[idx]
    pub fn add(&mut self, reg: Register, index: u32) -> Result<&mut Self, EncodingError> {
        self.emit(Opcode::AddMemory, reg, index)
    }

    /// `vsubi R, imm`: R -= imm
    pub fn subtract_immediate(&mut self, reg: Register, value: u32) -> Result<&mut Self, EncodingError> {
        self.emit(Opcode::SubtractImmediate, reg, value)
    }

    /// `vsub R, idx`: R -= mem[idx]
    pub fn subtract(&mut self, reg: Register, index: u32) -> Result<&mut Self, EncodingError> {
        self.emit(Opcode::SubtractMemory, reg, index)
    }

    /// `vput R`
    pub fn print(&mut self, reg: Register) -> &mut Self {
        self.code.push(encode(Opcode::Print, reg, 0));
        self
    }

    /// `vjnz R, offset`: if R != 0, continue at `pc + 1 + offset`
    ///
    /// Use [`mark_offset`](Self::mark_offset) to branch back to the mark.
    pub fn jump_if_non_zero(&mut self, reg: Register, offset: i32) -> Result<&mut Self, EncodingError> {
        let offset16 = i16::try_from(offset)
            .map_err(|_| EncodingError::BranchOffsetOutOfRange { offset })?;
        self.code.push(encode(Opcode::JumpIfNonZero, reg, offset16 as u16));
        Ok(self)
    }

    fn emit(&mut self, opcode: Opcode, reg: Register, operand: u32) -> Result<&mut Self, EncodingError> {
        let imm = u16::try_from(operand).map_err(|_| EncodingError::ImmediateOutOfRange {
            operation: opcode.mnemonic(),
            value: operand,
        })?;
        self.code.push(encode(opcode, reg, imm));
        Ok(self)
    }

    // ═════════════════════════════════════════════════════════════════
    // LABELS
    // ═════════════════════════════════════════════════════════════════

    /// Remembers the index of the next instruction to be emitted
    ///
    /// Only one mark exists; setting it again replaces the previous one.
    pub fn set_mark(&mut self) -> &mut Self {
        self.mark = self.code.len();
        self
    }

    /// Displacement for a `vjnz` emitted next that should land on the mark
    ///
    /// `mark - len - 1`: the branch is applied after the pc moved past the
    /// branch itself. Without a prior [`set_mark`](Self::set_mark) the mark
    /// is instruction 0.
    pub fn mark_offset(&self) -> i32 {
        let offset = self.mark as i64 - self.code.len() as i64 - 1;
        i32::try_from(offset).unwrap_or(i32::MIN)
    }

    // ═════════════════════════════════════════════════════════════════
    // ACCESS
    // ═════════════════════════════════════════════════════════════════

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Encoded words
    pub fn words(&self) -> &[u32] {
        &self.code
    }

    /// Decoded instructions, in order
    pub fn instructions(&self) -> impl Iterator<Item = Result<Instruction, EncodingError>> + '_ {
        self.code.iter().map(|&word| decode(word))
    }

    /// Listing with instruction indices and raw words
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (pc, &word) in self.code.iter().enumerate() {
            let text = match decode(word) {
                Ok(instr) => instr.disassemble(),
                Err(_) => "???".to_string(),
            };
            out.push_str(&format!("{:04}: {:08x}  {}\n", pc, word, text));
        }
        out
    }

    // ═════════════════════════════════════════════════════════════════
    // EXECUTION
    // ═════════════════════════════════════════════════════════════════

    /// Interprets the program from a fresh state, printing to stdout
    ///
    /// Honors `TOYVM_TRACE` through [`VmConfig::from_env`].
    pub fn run(&self) -> VmResult<VmState> {
        Interpreter::with_config(self, &VmConfig::from_env()).run()
    }

    /// Compiles the program to native code
    ///
    /// Honors `TOYVM_CACHED_CELLS` through [`VmConfig::from_env`].
    #[cfg(feature = "jit")]
    pub fn compile(&self) -> VmResult<super::jit::NativeRoutine> {
        let config = super::jit::JitConfig::from(&VmConfig::from_env());
        super::jit::JitCompiler::new(config)?.compile(self)
    }

    /// Compiles and invokes once, printing to stdout
    #[cfg(feature = "jit")]
    pub fn compile_and_run(&self) -> VmResult<super::jit::NativeRoutine> {
        let mut routine = self.compile()?;
        routine.invoke()?;
        Ok(routine)
    }
}
