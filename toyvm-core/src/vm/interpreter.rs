//! Bytecode interpreter
//!
//! Decodes one word per step and dispatches on the opcode. Arithmetic wraps
//! modulo 2^32. A taken `vjnz` continues at `pc + 1 + offset`; landing
//! exactly on the instruction count ends the run, anything else outside
//! the program is a [`ProgramError`].

use std::io::{self, Write};
use std::time::Instant;

use tracing::{debug, trace};

use super::console::write_register;
use super::error::{ProgramError, VmResult};
use super::instruction::decode;
use super::opcode::Opcode;
use super::program::Program;
use super::state::VmState;
use crate::config::VmConfig;

/// Statistics for interpreter execution
#[derive(Debug, Clone, Default)]
pub struct InterpreterStats {
    pub runs: u64,
    pub instructions_executed: u64,
    pub execute_time_us: u64,
}

/// Interpreter over a borrowed program
pub struct Interpreter<'p> {
    program: &'p Program,
    trace: bool,
    stats: InterpreterStats,
}

impl<'p> Interpreter<'p> {
    /// Creates an interpreter with [`VmConfig::default`]
    ///
    /// The environment is not consulted; use [`with_config`](Self::with_config)
    /// with [`VmConfig::from_env`] for that.
    pub fn new(program: &'p Program) -> Self {
        Self::with_config(program, &VmConfig::default())
    }

    pub fn with_config(program: &'p Program, config: &VmConfig) -> Self {
        Self {
            program,
            trace: config.trace_execution,
            stats: InterpreterStats::default(),
        }
    }

    /// Runs to completion from a fresh state, printing to stdout
    pub fn run(&mut self) -> VmResult<VmState> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.run_with_output(&mut out)
    }

    /// Runs to completion from a fresh state, printing to `out`
    pub fn run_with_output<W: Write + ?Sized>(&mut self, out: &mut W) -> VmResult<VmState> {
        let start = Instant::now();
        let mut state = VmState::new();
        let mut executed = 0u64;

        while self.step(&mut state, &mut *out)? {
            executed += 1;
        }
        out.flush()?;

        let elapsed = start.elapsed();
        self.stats.runs += 1;
        self.stats.instructions_executed += executed;
        self.stats.execute_time_us += elapsed.as_micros() as u64;
        debug!(executed, elapsed_us = elapsed.as_micros() as u64, "interpreter run finished");

        Ok(state)
    }

    /// Executes the instruction at `state.pc`
    ///
    /// Returns `false` once the pc has reached the end, without executing.
    #[inline(always)]
    pub fn step<W: Write + ?Sized>(&self, state: &mut VmState, out: &mut W) -> VmResult<bool> {
        let code = self.program.words();
        let end = code.len();
        let pc = state.pc;
        if pc >= end {
            return Ok(false);
        }

        let instr = decode(code[pc])?;
        if self.trace {
            trace!(
                pc,
                a = state.registers[0],
                b = state.registers[1],
                mem0 = state.memory.get(0),
                mem1 = state.memory.get(1),
                mem2 = state.memory.get(2),
                instr = %instr,
            );
        }

        let r = instr.register.index();
        let imm = instr.immediate;
        let regs = &mut state.registers;

        match instr.opcode {
            Opcode::LoadImmediate => regs[r] = u32::from(imm),
            Opcode::LoadMemory => regs[r] = state.memory.get(imm),
            Opcode::StoreMemory => state.memory.set(imm, regs[r]),
            Opcode::AddMemory => regs[r] = regs[r].wrapping_add(state.memory.get(imm)),
            Opcode::AddImmediate => regs[r] = regs[r].wrapping_add(u32::from(imm)),
            Opcode::SubtractMemory => regs[r] = regs[r].wrapping_sub(state.memory.get(imm)),
            Opcode::SubtractImmediate => regs[r] = regs[r].wrapping_sub(u32::from(imm)),
            Opcode::Print => write_register(&mut *out, instr.register, regs[r])?,
            Opcode::JumpIfNonZero => {
                if regs[r] != 0 {
                    let target = instr.branch_target(pc);
                    if target < 0 || target > end as i64 {
                        return Err(ProgramError::JumpOutOfRange { pc, target, len: end }.into());
                    }
                    state.pc = target as usize;
                    return Ok(true);
                }
            }
        }

        state.pc = pc + 1;
        Ok(true)
    }

    /// Get statistics
    pub fn stats(&self) -> &InterpreterStats {
        &self.stats
    }
}
