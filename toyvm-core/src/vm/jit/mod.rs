//! DynASM JIT recompiler
//!
//! Translates a [`Program`] into one native routine in a single linear pass,
//! one block per virtual instruction, each block starting at its own
//! dynamic label. Branches refer to instruction indices only; DynASM
//! patches the displacements once every label is placed.
//!
//! ## Register allocation
//! - two callee-saved host registers hold the virtual registers A and B
//! - up to [`MAX_CACHED_CELLS`] more hold memory cells `0..cached_cells`
//! - one holds the base address of the routine's memory array
//!
//! The routine takes no arguments and returns nothing. The addresses of
//! its memory array and of its [`NativeFrame`] are baked into the code;
//! the epilogue writes A, B and the cached cells back so the final state
//! can be read after [`NativeRoutine::invoke`].

use std::ffi::c_void;
use std::io::{self, Write};
use std::mem::offset_of;
use std::ptr;
use std::time::Instant;

use dynasmrt::{AssemblyOffset, ExecutableBuffer};
use tracing::{debug, warn};

use super::console::Console;
use super::error::{CodegenError, ProgramError, VmResult};
use super::instruction::{decode, Instruction, Register};
use super::program::Program;
use super::state::{Memory, VmState};
use crate::config::{VmConfig, DEFAULT_CACHED_CELLS};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "x86_64")]
mod x64;

/// Host registers reserved for cached memory cells
pub const MAX_CACHED_CELLS: usize = 3;

/// JIT configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitConfig {
    /// Memory cells `0..cached_cells` live in host registers
    pub cached_cells: usize,
}

/// Three cached cells, regardless of `TOYVM_CACHED_CELLS`
impl Default for JitConfig {
    fn default() -> Self {
        Self { cached_cells: DEFAULT_CACHED_CELLS }
    }
}

impl From<&VmConfig> for JitConfig {
    fn from(config: &VmConfig) -> Self {
        Self { cached_cells: config.cached_cells }
    }
}

/// Compilation statistics
#[derive(Debug, Clone, Default)]
pub struct JitStats {
    /// Time spent compiling the last program (milliseconds)
    pub compile_time_ms: f64,

    /// Number of programs compiled
    pub compile_count: u32,

    /// Size of the last compiled routine (bytes)
    pub code_size: usize,

    /// Number of virtual instructions in the last program
    pub instruction_count: usize,

    /// Number of completed invocations
    pub exec_count: u32,
}

/// State shared between a native routine and Rust
///
/// Field offsets are baked into generated code.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct NativeFrame {
    /// A and B at routine exit
    registers: [u32; 2],
    /// `pc + 1` of a branch that left the program, 0 if none
    fault_pc: u32,
    /// Target of that branch
    fault_target: i32,
    /// `*mut Console` while a call is in progress
    console: *mut c_void,
}

impl NativeFrame {
    fn new() -> Self {
        Self {
            registers: [0; 2],
            fault_pc: 0,
            fault_target: 0,
            console: ptr::null_mut(),
        }
    }
}

const FRAME_REGISTERS: usize = offset_of!(NativeFrame, registers);
const FRAME_FAULT_PC: usize = offset_of!(NativeFrame, fault_pc);
const FRAME_FAULT_TARGET: usize = offset_of!(NativeFrame, fault_target);

/// Addresses baked into a routine
pub(crate) struct Layout {
    memory: u64,
    frame: u64,
    print: u64,
}

fn print_from_native(frame: *mut NativeFrame, register: u32, value: u32) {
    // SAFETY: `frame` is the frame owned by the running routine, and a
    // non-null `console` points at the Console living on `invoke`'s stack.
    let console = unsafe { (*frame).console.cast::<Console<'_>>() };
    if console.is_null() {
        return;
    }
    let reg = if register == 0 { Register::A } else { Register::B };
    unsafe { (*console).print(reg, value) };
}

#[cfg(target_arch = "x86_64")]
extern "sysv64" fn print_trampoline(frame: *mut NativeFrame, register: u32, value: u32) {
    print_from_native(frame, register, value)
}

#[cfg(target_arch = "aarch64")]
extern "C" fn print_trampoline(frame: *mut NativeFrame, register: u32, value: u32) {
    print_from_native(frame, register, value)
}

#[cfg(target_arch = "x86_64")]
type NativeEntry = unsafe extern "sysv64" fn();

#[cfg(target_arch = "aarch64")]
type NativeEntry = unsafe extern "C" fn();

/// Casts the finalized buffer to a callable routine
///
/// # Safety
/// `code` must hold a routine emitted by this module's backend starting at
/// `entry`, and the memory and frame whose addresses it embeds must be
/// alive and not otherwise borrowed when the result is called.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
unsafe fn entry_point(code: &ExecutableBuffer, entry: AssemblyOffset) -> NativeEntry {
    unsafe { std::mem::transmute::<*const u8, NativeEntry>(code.ptr(entry)) }
}

/// Compiled program
///
/// Owns its code, its memory array and its frame. Each invocation starts
/// from zeroed registers and memory.
pub struct NativeRoutine {
    code: ExecutableBuffer,
    entry: AssemblyOffset,
    frame: Box<NativeFrame>,
    // Never reassigned: the routine holds its address.
    memory: Memory,
    cached_cells: usize,
    stats: JitStats,
}

impl NativeRoutine {
    /// Runs the routine, printing to stdout
    pub fn invoke(&mut self) -> VmResult<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.invoke_with_output(&mut out)
    }

    /// Runs the routine, printing to `out`
    pub fn invoke_with_output<W: Write>(&mut self, out: &mut W) -> VmResult<()> {
        self.memory.clear();
        *self.frame = NativeFrame::new();

        let mut console = Console::new(out);
        self.frame.console = (&mut console as *mut Console<'_>).cast();

        self.call();

        self.frame.console = ptr::null_mut();
        self.stats.exec_count += 1;
        console.finish()?;

        if self.frame.fault_pc != 0 {
            let pc = self.frame.fault_pc as usize - 1;
            let target = i64::from(self.frame.fault_target);
            warn!(pc, target, "native routine left the program");
            return Err(ProgramError::JumpOutOfRange {
                pc,
                target,
                len: self.stats.instruction_count,
            }
            .into());
        }
        Ok(())
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    fn call(&mut self) {
        // SAFETY: the code came from our backend; `self.memory` and
        // `self.frame` are the allocations whose addresses it embeds, both
        // owned by `self` and exclusively borrowed for this call.
        unsafe {
            let routine = entry_point(&self.code, self.entry);
            routine();
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    fn call(&mut self) {}

    /// A and B at the end of the last invocation
    pub fn registers(&self) -> [u32; 2] {
        self.frame.registers
    }

    pub fn register(&self, reg: Register) -> u32 {
        self.frame.registers[reg.index()]
    }

    /// Memory at the end of the last invocation, cached cells included
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Final state in interpreter form
    pub fn state(&self) -> VmState {
        VmState {
            registers: self.registers(),
            pc: self.stats.instruction_count,
            memory: self.memory.clone(),
        }
    }

    /// Size of the native code (bytes)
    pub fn code_size(&self) -> usize {
        self.code.len()
    }

    pub fn instruction_count(&self) -> usize {
        self.stats.instruction_count
    }

    pub fn cached_cells(&self) -> usize {
        self.cached_cells
    }

    /// Compilation statistics plus invocation count
    pub fn stats(&self) -> &JitStats {
        &self.stats
    }
}

impl std::fmt::Debug for NativeRoutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRoutine")
            .field("code_size", &self.code.len())
            .field("cached_cells", &self.cached_cells)
            .field("stats", &self.stats)
            .finish()
    }
}

/// JIT compiler for the host architecture
#[derive(Debug)]
pub struct JitCompiler {
    config: JitConfig,
    stats: JitStats,
}

impl JitCompiler {
    /// Creates the compiler, validating the configuration against the host
    pub fn new(config: JitConfig) -> VmResult<Self> {
        if !cfg!(any(target_arch = "x86_64", target_arch = "aarch64")) {
            return Err(CodegenError::UnsupportedHost(std::env::consts::ARCH).into());
        }
        if config.cached_cells > MAX_CACHED_CELLS {
            return Err(CodegenError::TooManyCachedCells {
                requested: config.cached_cells,
                max: MAX_CACHED_CELLS,
            }
            .into());
        }
        Ok(Self { config, stats: JitStats::default() })
    }

    /// Compiles `program` to a native routine
    pub fn compile(&mut self, program: &Program) -> VmResult<NativeRoutine> {
        let start = Instant::now();

        let code = program
            .words()
            .iter()
            .enumerate()
            .map(|(pc, &word)| {
                decode(word).map_err(|_| CodegenError::InvalidInstruction { pc, word })
            })
            .collect::<Result<Vec<Instruction>, _>>()?;

        let mut memory = Memory::new();
        let mut frame = Box::new(NativeFrame::new());
        let layout = Layout {
            memory: memory.as_mut_ptr() as u64,
            frame: ptr::addr_of_mut!(*frame) as u64,
            print: native_print_address(),
        };

        let (buffer, entry) = assemble(&code, self.config.cached_cells, &layout)?;

        let elapsed = start.elapsed();
        self.stats.compile_time_ms = elapsed.as_secs_f64() * 1000.0;
        self.stats.compile_count += 1;
        self.stats.code_size = buffer.len();
        self.stats.instruction_count = code.len();
        debug!(
            instructions = code.len(),
            code_size = buffer.len(),
            cached_cells = self.config.cached_cells,
            compile_us = elapsed.as_micros() as u64,
            "compiled native routine"
        );

        Ok(NativeRoutine {
            code: buffer,
            entry,
            frame,
            memory,
            cached_cells: self.config.cached_cells,
            stats: JitStats { exec_count: 0, ..self.stats.clone() },
        })
    }

    /// Compiles and invokes once, printing to stdout
    pub fn compile_and_execute(&mut self, program: &Program) -> VmResult<NativeRoutine> {
        let mut routine = self.compile(program)?;
        routine.invoke()?;
        self.stats.exec_count += 1;
        Ok(routine)
    }

    /// Get compilation statistics
    pub fn stats(&self) -> &JitStats {
        &self.stats
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn native_print_address() -> u64 {
    print_trampoline as *const () as u64
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn native_print_address() -> u64 {
    0
}

#[cfg(target_arch = "x86_64")]
fn assemble(
    code: &[Instruction],
    cached_cells: usize,
    layout: &Layout,
) -> Result<(ExecutableBuffer, AssemblyOffset), CodegenError> {
    x64::assemble(code, cached_cells, layout)
}

#[cfg(target_arch = "aarch64")]
fn assemble(
    code: &[Instruction],
    cached_cells: usize,
    layout: &Layout,
) -> Result<(ExecutableBuffer, AssemblyOffset), CodegenError> {
    aarch64::assemble(code, cached_cells, layout)
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn assemble(
    _code: &[Instruction],
    _cached_cells: usize,
    _layout: &Layout,
) -> Result<(ExecutableBuffer, AssemblyOffset), CodegenError> {
    Err(CodegenError::UnsupportedHost(std::env::consts::ARCH))
}

/// Index of the dynamic label a taken branch at `pc` jumps to, if inside
/// `0..=len`
fn branch_label(instr: &Instruction, pc: usize, len: usize) -> Option<usize> {
    let target = instr.branch_target(pc);
    (0..=len as i64).contains(&target).then_some(target as usize)
}

/// Cached host register slot for a memory index
#[inline]
fn cached_slot(index: u16, cached_cells: usize) -> Option<usize> {
    let index = usize::from(index);
    (index < cached_cells).then_some(index)
}

#[cfg(all(test, any(target_arch = "x86_64", target_arch = "aarch64")))]
mod tests {
    use super::*;
    use crate::vm::error::VmError;
    use crate::vm::instruction::Register::*;
    use crate::vm::interpreter::Interpreter;

    fn jit(cached_cells: usize) -> JitCompiler {
        JitCompiler::new(JitConfig { cached_cells }).unwrap()
    }

    fn invoke(routine: &mut NativeRoutine) -> String {
        let mut out = Vec::new();
        routine.invoke_with_output(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_rejects_too_many_cached_cells() {
        let err = JitCompiler::new(JitConfig { cached_cells: 4 }).unwrap_err();
        assert!(matches!(
            err,
            VmError::Codegen(CodegenError::TooManyCachedCells { requested: 4, max: 3 })
        ));
    }

    #[test]
    fn test_compile_empty_program() {
        let mut compiler = jit(3);
        let mut routine = compiler.compile(&Program::new()).unwrap();
        assert!(routine.code_size() > 0);
        assert_eq!(invoke(&mut routine), "");
        assert_eq!(routine.registers(), [0, 0]);
        assert_eq!(compiler.stats().compile_count, 1);
        assert_eq!(compiler.stats().instruction_count, 0);
    }

    #[test]
    fn test_print_unloaded_register() {
        let mut p = Program::new();
        p.print(A);
        let mut routine = jit(3).compile(&p).unwrap();
        assert_eq!(invoke(&mut routine), "A        0(0x00000000)\n");
    }

    #[test]
    fn test_cached_and_backing_cells() {
        for cached in 0..=MAX_CACHED_CELLS {
            let mut p = Program::new();
            p.load_immediate(A, 11).unwrap()
                .store(A, 0).unwrap()
                .store(A, 2).unwrap()
                .load_immediate(B, 5).unwrap()
                .store(B, 1).unwrap()
                .store(B, 0xFFFF).unwrap()
                .add(A, 1).unwrap()        // 16
                .subtract(B, 0).unwrap()   // 5 - 11
                .add(B, 0xFFFF).unwrap()   // -6 + 5 = -1
                .subtract(A, 0xFFFF).unwrap() // 11
                .load(A, 2).unwrap()
                .add_immediate(A, 0xFFFF).unwrap()
                .subtract_immediate(A, 3).unwrap();

            let mut routine = jit(cached).compile(&p).unwrap();
            invoke(&mut routine);

            assert_eq!(routine.registers(), [11 + 0xFFFF - 3, u32::MAX], "cached = {cached}");
            assert_eq!(&routine.memory().as_slice()[..3], &[11, 5, 11]);
            assert_eq!(routine.memory().get(0xFFFF), 5);
        }
    }

    #[test]
    fn test_wrapping_add_immediate() {
        let mut p = Program::new();
        p.subtract_immediate(A, 1).unwrap().add_immediate(A, 1).unwrap();
        let mut routine = jit(3).compile(&p).unwrap();
        invoke(&mut routine);
        assert_eq!(routine.register(A), 0);
    }

    #[test]
    fn test_loop_matches_interpreter() {
        let mut p = Program::new();
        p.load_immediate(B, 100).unwrap();
        p.store(B, 1).unwrap();
        p.set_mark();
        p.add_immediate(A, 7).unwrap();
        p.print(A);
        p.load(B, 1).unwrap();
        p.subtract_immediate(B, 1).unwrap();
        p.store(B, 1).unwrap();
        p.jump_if_non_zero(B, p.mark_offset()).unwrap();

        let mut expected = Vec::new();
        let state = Interpreter::new(&p).run_with_output(&mut expected).unwrap();

        let mut routine = jit(3).compile(&p).unwrap();
        let out = invoke(&mut routine);
        assert_eq!(out.as_bytes(), expected.as_slice());
        assert_eq!(routine.registers(), state.registers);
        assert_eq!(routine.state(), state);
    }

    #[test]
    fn test_forward_jump() {
        let mut p = Program::new();
        p.load_immediate(A, 1).unwrap()
            .jump_if_non_zero(A, 1).unwrap()
            .load_immediate(B, 9).unwrap()
            .print(B);
        let mut routine = jit(3).compile(&p).unwrap();
        assert_eq!(invoke(&mut routine), "B        0(0x00000000)\n");
    }

    #[test]
    fn test_jump_out_of_range_faults() {
        let mut p = Program::new();
        p.load_immediate(A, 1).unwrap()
            .jump_if_non_zero(A, 2).unwrap()
            .print(A);
        let mut routine = jit(3).compile(&p).unwrap();

        let mut out = Vec::new();
        let err = routine.invoke_with_output(&mut out).unwrap_err();
        assert!(matches!(
            err,
            VmError::Program(ProgramError::JumpOutOfRange { pc: 1, target: 4, len: 3 })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_untaken_out_of_range_jump_is_harmless() {
        let mut p = Program::new();
        p.jump_if_non_zero(A, -20).unwrap().print(A);
        let mut routine = jit(3).compile(&p).unwrap();
        assert_eq!(invoke(&mut routine), "A        0(0x00000000)\n");
    }

    #[test]
    fn test_invoke_is_repeatable() {
        let mut p = Program::new();
        p.load(A, 5).unwrap()
            .add_immediate(A, 2).unwrap()
            .store(A, 5).unwrap()
            .print(A);
        let mut routine = jit(3).compile(&p).unwrap();
        assert_eq!(invoke(&mut routine), "A        2(0x00000002)\n");
        assert_eq!(invoke(&mut routine), "A        2(0x00000002)\n");
        assert_eq!(routine.stats().exec_count, 2);
    }
}
