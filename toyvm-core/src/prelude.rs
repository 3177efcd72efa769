//! # Prelude
//!
//! ```
//! use toyvm_core::prelude::*;
//! ```

pub use crate::config::VmConfig;
pub use crate::samples;

pub use crate::vm::{
    EncodingError,
    Instruction,
    Interpreter,
    Memory,
    Opcode,
    Program,
    ProgramError,
    Register,
    VmError,
    VmResult,
    VmState,
};

#[cfg(feature = "jit")]
pub use crate::vm::{CodegenError, JitCompiler, JitConfig, NativeRoutine};
