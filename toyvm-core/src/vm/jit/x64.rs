//! x86-64 backend
//!
//! The routine and the print trampoline use the System V calling convention
//! on every x86-64 host, so the same code runs on Linux, macOS and Windows.
//!
//! ## Registers
//! - r12d, r13d: A and B
//! - r14d, r15d, ebx: memory cells 0, 1, 2 when cached
//! - rbp: base of the memory array
//! - rax: scratch
//!
//! All of the above except rax are callee-saved, so they survive the call
//! into the print trampoline without spilling.

use dynasmrt::x64::Assembler;
use dynasmrt::{dynasm, AssemblyOffset, DynamicLabel, DynasmApi, DynasmLabelApi, ExecutableBuffer};

use super::{
    branch_label, cached_slot, Layout, FRAME_FAULT_PC, FRAME_FAULT_TARGET, FRAME_REGISTERS,
};
use crate::vm::error::CodegenError;
use crate::vm::instruction::{Instruction, Register};
use crate::vm::opcode::Opcode;

const REG_A: u8 = 12;
const REG_B: u8 = 13;
const CACHE_REGS: [u8; 3] = [14, 15, 3];

#[inline]
fn host_register(reg: Register) -> u8 {
    match reg {
        Register::A => REG_A,
        Register::B => REG_B,
    }
}

/// Emits the routine for `code`
pub(super) fn assemble(
    code: &[Instruction],
    cached_cells: usize,
    layout: &Layout,
) -> Result<(ExecutableBuffer, AssemblyOffset), CodegenError> {
    let mut ops = Assembler::new().map_err(CodegenError::Assembler)?;

    // One label per instruction plus one for the epilogue
    let labels: Vec<DynamicLabel> = (0..=code.len()).map(|_| ops.new_dynamic_label()).collect();
    let end = labels[code.len()];

    let memory = layout.memory as i64;
    let entry = ops.offset();

    dynasm!(ops
        ; .arch x64
        ; push rbx
        ; push rbp
        ; push r12
        ; push r13
        ; push r14
        ; push r15
        // six pushes leave rsp 8 bytes off a 16-byte boundary
        ; sub rsp, 8

        ; xor r12d, r12d
        ; xor r13d, r13d
        ; xor r14d, r14d
        ; xor r15d, r15d
        ; xor ebx, ebx
        ; mov rbp, QWORD memory
    );

    for (pc, instr) in code.iter().enumerate() {
        let here = labels[pc];
        dynasm!(ops ; .arch x64 ; =>here);
        emit_instruction(&mut ops, instr, pc, code.len(), cached_cells, layout, &labels);
    }

    let frame = layout.frame as i64;
    let reg_a = FRAME_REGISTERS as i32;
    let reg_b = (FRAME_REGISTERS + 4) as i32;

    dynasm!(ops
        ; .arch x64
        ; =>end
        ; mov rax, QWORD frame
        ; mov DWORD [rax + reg_a], r12d
        ; mov DWORD [rax + reg_b], r13d
    );

    // Write cached cells back
    for (cell, &host) in CACHE_REGS.iter().enumerate().take(cached_cells) {
        let disp = (cell * 4) as i32;
        dynasm!(ops ; .arch x64 ; mov DWORD [rbp + disp], Rd(host));
    }

    dynasm!(ops
        ; .arch x64
        ; add rsp, 8
        ; pop r15
        ; pop r14
        ; pop r13
        ; pop r12
        ; pop rbp
        ; pop rbx
        ; ret
    );

    let buffer = ops.finalize().map_err(|_| CodegenError::Finalize)?;
    Ok((buffer, entry))
}

fn emit_instruction(
    ops: &mut Assembler,
    instr: &Instruction,
    pc: usize,
    len: usize,
    cached_cells: usize,
    layout: &Layout,
    labels: &[DynamicLabel],
) {
    let r = host_register(instr.register);
    let imm = i32::from(instr.immediate);
    let disp = imm * 4;
    let cached = cached_slot(instr.immediate, cached_cells).map(|slot| CACHE_REGS[slot]);

    match instr.opcode {
        Opcode::LoadImmediate => { dynasm!(ops ; .arch x64 ; mov Rd(r), imm); }
        Opcode::AddImmediate => { dynasm!(ops ; .arch x64 ; add Rd(r), imm); }
        Opcode::SubtractImmediate => { dynasm!(ops ; .arch x64 ; sub Rd(r), imm); }

        Opcode::LoadMemory => match cached {
            Some(c) => { dynasm!(ops ; .arch x64 ; mov Rd(r), Rd(c)); }
            None => { dynasm!(ops ; .arch x64 ; mov Rd(r), DWORD [rbp + disp]); }
        },
        Opcode::StoreMemory => match cached {
            Some(c) => { dynasm!(ops ; .arch x64 ; mov Rd(c), Rd(r)); }
            None => { dynasm!(ops ; .arch x64 ; mov DWORD [rbp + disp], Rd(r)); }
        },
        Opcode::AddMemory => match cached {
            Some(c) => { dynasm!(ops ; .arch x64 ; add Rd(r), Rd(c)); }
            None => { dynasm!(ops ; .arch x64 ; add Rd(r), DWORD [rbp + disp]); }
        },
        Opcode::SubtractMemory => match cached {
            Some(c) => { dynasm!(ops ; .arch x64 ; sub Rd(r), Rd(c)); }
            None => { dynasm!(ops ; .arch x64 ; sub Rd(r), DWORD [rbp + disp]); }
        },

        Opcode::Print => {
            let frame = layout.frame as i64;
            let print = layout.print as i64;
            let index = instr.register.index() as i32;
            dynasm!(ops
                ; .arch x64
                ; mov rdi, QWORD frame
                ; mov esi, index
                ; mov edx, Rd(r)
                ; mov rax, QWORD print
                ; call rax
            );
        }

        Opcode::JumpIfNonZero => match branch_label(instr, pc, len) {
            Some(target) => {
                let label = labels[target];
                dynasm!(ops
                    ; .arch x64
                    ; test Rd(r), Rd(r)
                    ; jnz =>label
                );
            }
            None => {
                // Taken branch leaves the program: record it and exit
                let frame = layout.frame as i64;
                let fault_pc = (pc + 1) as i32;
                let fault_target = instr.branch_target(pc) as i32;
                let pc_disp = FRAME_FAULT_PC as i32;
                let target_disp = FRAME_FAULT_TARGET as i32;
                let end = labels[len];
                dynasm!(ops
                    ; .arch x64
                    ; test Rd(r), Rd(r)
                    ; jz >fallthrough
                    ; mov rax, QWORD frame
                    ; mov DWORD [rax + pc_disp], fault_pc
                    ; mov DWORD [rax + target_disp], fault_target
                    ; jmp =>end
                    ; fallthrough:
                );
            }
        },
    }
}
