//! # ToyVM Core
//!
//! A two-register bytecode machine with an interpreter and a native JIT
//! recompiler, used to measure the gap between interpreting a tiny
//! instruction set and running the same program as native code.
//!
//! ## Modules
//!
//! - [`vm`]: encoding, program buffer, interpreter and JIT
//! - [`config`]: environment and `.env` configuration
//! - [`samples`]: the Fibonacci program and its native Rust counterpart
//!
//! ## Quick Start
//!
//! ```
//! use toyvm_core::prelude::*;
//!
//! let program = samples::fibonacci(10)?;
//! let mut out = Vec::new();
//! let state = Interpreter::new(&program).run_with_output(&mut out)?;
//!
//! assert_eq!(state.register(Register::A), 144);
//! assert_eq!(out, b"A      144(0x00000090)\n");
//! # Ok::<(), VmError>(())
//! ```

pub mod config;
pub mod prelude;
pub mod samples;
pub mod vm;
