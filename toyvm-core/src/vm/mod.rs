//! # ToyVM
//!
//! Two 32-bit registers, 65536 memory cells and nine instructions, with two
//! interchangeable execution engines over the same encoded program.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     Program buffer                        │
//! │        emit ops ──► [u32; n]  +  mark (backward jumps)    │
//! └───────────────┬───────────────────────────┬───────────────┘
//!                 │                           │
//!                 ▼                           ▼
//!      ┌─────────────────────┐     ┌─────────────────────────┐
//!      │     Interpreter     │     │      JIT (DynASM)       │
//!      │  decode + dispatch  │     │ x86-64 / ARM64 routine  │
//!      └──────────┬──────────┘     └────────────┬────────────┘
//!                 │                             │
//!                 └──────────► console ◄────────┘
//! ```
//!
//! ## Modules
//!
//! - [`opcode`] - the nine operations
//! - [`instruction`] - word layout, encode and decode
//! - [`program`] - program buffer and emission
//! - [`state`] - registers and memory
//! - [`interpreter`] - reference engine
//! - [`jit`] - native engine
//!
//! ## Usage
//!
//! ```
//! use toyvm_core::vm::{Program, Register::*};
//!
//! let mut p = Program::new();
//! p.load_immediate(A, 2)?.add_immediate(A, 40)?;
//! let state = p.run()?;
//! assert_eq!(state.registers[0], 42);
//! # Ok::<(), toyvm_core::vm::VmError>(())
//! ```

pub mod console;
pub mod error;
pub mod instruction;
pub mod interpreter;
pub mod opcode;
pub mod program;
pub mod state;

#[cfg(feature = "jit")]
pub mod jit;

pub use console::{format_register, write_register};
pub use error::{CodegenError, EncodingError, ProgramError, VmError, VmResult};
pub use instruction::{decode, encode, Instruction, Register};
pub use interpreter::{Interpreter, InterpreterStats};
pub use opcode::{Opcode, OperandKind};
pub use program::Program;
pub use state::{Memory, VmState, MEMORY_CELLS};

#[cfg(feature = "jit")]
pub use jit::{JitCompiler, JitConfig, JitStats, NativeRoutine, MAX_CACHED_CELLS};
