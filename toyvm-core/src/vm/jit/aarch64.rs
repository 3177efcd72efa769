//! ARM64 backend
//!
//! ## Registers
//! - w19, w20: A and B
//! - w21-w23: memory cells 0, 1, 2 when cached
//! - x24: base of the memory array
//! - x25: frame address
//! - x9: scratch
//! - x16: trampoline address for `blr`
//!
//! x19-x25 are callee-saved and survive the trampoline call.

use dynasmrt::aarch64::Assembler;
use dynasmrt::{dynasm, AssemblyOffset, DynamicLabel, DynasmApi, DynasmLabelApi, ExecutableBuffer};

use super::{
    branch_label, cached_slot, Layout, FRAME_FAULT_PC, FRAME_FAULT_TARGET, FRAME_REGISTERS,
};
use crate::vm::error::CodegenError;
use crate::vm::instruction::{Instruction, Register};
use crate::vm::opcode::Opcode;

const REG_A: u32 = 19;
const REG_B: u32 = 20;
const CACHE_REGS: [u32; 3] = [21, 22, 23];
const REG_SCRATCH: u32 = 9;
const REG_CALL: u32 = 16;

#[inline]
fn host_register(reg: Register) -> u32 {
    match reg {
        Register::A => REG_A,
        Register::B => REG_B,
    }
}

/// movz/movk sequence for a 64-bit constant
fn load_u64(ops: &mut Assembler, reg: u32, value: u64) {
    let h0 = (value & 0xFFFF) as u32;
    let h1 = ((value >> 16) & 0xFFFF) as u32;
    let h2 = ((value >> 32) & 0xFFFF) as u32;
    let h3 = ((value >> 48) & 0xFFFF) as u32;
    dynasm!(ops
        ; .arch aarch64
        ; movz X(reg), #h0
        ; movk X(reg), #h1, lsl #16
        ; movk X(reg), #h2, lsl #32
        ; movk X(reg), #h3, lsl #48
    );
}

fn load_u32(ops: &mut Assembler, reg: u32, value: u32) {
    let lo = value & 0xFFFF;
    let hi = value >> 16;
    dynasm!(ops
        ; .arch aarch64
        ; movz W(reg), #lo
        ; movk W(reg), #hi, lsl #16
    );
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

    let entry = ops.offset();

    dynasm!(ops
        ; .arch aarch64
        ; stp x29, x30, [sp, #-16]!
        ; mov x29, sp
        ; stp x19, x20, [sp, #-16]!
        ; stp x21, x22, [sp, #-16]!
        ; stp x23, x24, [sp, #-16]!
        ; stp x25, x26, [sp, #-16]!

        ; movz w19, #0
        ; movz w20, #0
        ; movz w21, #0
        ; movz w22, #0
        ; movz w23, #0
    );
    load_u64(&mut ops, 24, layout.memory);
    load_u64(&mut ops, 25, layout.frame);

    for (pc, instr) in code.iter().enumerate() {
        let here = labels[pc];
        dynasm!(ops ; .arch aarch64 ; =>here);
        emit_instruction(&mut ops, instr, pc, code.len(), cached_cells, layout, &labels);
    }

    let reg_a = FRAME_REGISTERS as u32;
    let reg_b = (FRAME_REGISTERS + 4) as u32;

    dynasm!(ops
        ; .arch aarch64
        ; =>end
        ; str w19, [x25, #reg_a]
        ; str w20, [x25, #reg_b]
    );

    // Write cached cells back
    for (cell, &host) in CACHE_REGS.iter().enumerate().take(cached_cells) {
        let offset = (cell * 4) as u32;
        dynasm!(ops ; .arch aarch64 ; str W(host), [x24, #offset]);
    }

    dynasm!(ops
        ; .arch aarch64
        ; ldp x25, x26, [sp], #16
        ; ldp x23, x24, [sp], #16
        ; ldp x21, x22, [sp], #16
        ; ldp x19, x20, [sp], #16
        ; ldp x29, x30, [sp], #16
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
    let imm = u32::from(instr.immediate);
    let cached = cached_slot(instr.immediate, cached_cells).map(|slot| CACHE_REGS[slot]);
    let s = REG_SCRATCH;

    match instr.opcode {
        Opcode::LoadImmediate => {
            dynasm!(ops ; .arch aarch64 ; movz W(r), #imm);
        }
        Opcode::AddImmediate => {
            dynasm!(ops ; .arch aarch64 ; movz W(s), #imm ; add W(r), W(r), W(s));
        }
        Opcode::SubtractImmediate => {
            dynasm!(ops ; .arch aarch64 ; movz W(s), #imm ; sub W(r), W(r), W(s));
        }

        Opcode::LoadMemory => match cached {
            Some(c) => {
                dynasm!(ops ; .arch aarch64 ; mov W(r), W(c));
            }
            None => {
                dynasm!(ops ; .arch aarch64 ; movz X(s), #imm ; ldr W(r), [x24, X(s), lsl #2]);
            }
        },
        Opcode::StoreMemory => match cached {
            Some(c) => {
                dynasm!(ops ; .arch aarch64 ; mov W(c), W(r));
            }
            None => {
                dynasm!(ops ; .arch aarch64 ; movz X(s), #imm ; str W(r), [x24, X(s), lsl #2]);
            }
        },
        Opcode::AddMemory => match cached {
            Some(c) => {
                dynasm!(ops ; .arch aarch64 ; add W(r), W(r), W(c));
            }
            None => {
                dynasm!(ops
                    ; .arch aarch64
                    ; movz X(s), #imm
                    ; ldr W(s), [x24, X(s), lsl #2]
                    ; add W(r), W(r), W(s)
                );
            }
        },
        Opcode::SubtractMemory => match cached {
            Some(c) => {
                dynasm!(ops ; .arch aarch64 ; sub W(r), W(r), W(c));
            }
            None => {
                dynasm!(ops
                    ; .arch aarch64
                    ; movz X(s), #imm
                    ; ldr W(s), [x24, X(s), lsl #2]
                    ; sub W(r), W(r), W(s)
                );
            }
        },

        Opcode::Print => {
            let index = instr.register.index() as u32;
            dynasm!(ops
                ; .arch aarch64
                ; mov x0, x25
                ; movz w1, #index
                ; mov w2, W(r)
            );
            load_u64(ops, REG_CALL, layout.print);
            dynasm!(ops ; .arch aarch64 ; blr X(REG_CALL));
        }

        // cbz over an unconditional b: cbnz alone reaches only +-1MB
        Opcode::JumpIfNonZero => match branch_label(instr, pc, len) {
            Some(target) => {
                let label = labels[target];
                dynasm!(ops
                    ; .arch aarch64
                    ; cbz W(r), >fallthrough
                    ; b =>label
                    ; fallthrough:
                );
            }
            None => {
                // Taken branch leaves the program: record it and exit
                let fault_pc = (pc + 1) as u32;
                let fault_target = instr.branch_target(pc) as i32 as u32;
                let pc_offset = FRAME_FAULT_PC as u32;
                let target_offset = FRAME_FAULT_TARGET as u32;
                let end = labels[len];
                dynasm!(ops ; .arch aarch64 ; cbz W(r), >fallthrough);
                load_u32(ops, s, fault_pc);
                dynasm!(ops ; .arch aarch64 ; str W(s), [x25, #pc_offset]);
                load_u32(ops, s, fault_target);
                dynasm!(ops
                    ; .arch aarch64
                    ; str W(s), [x25, #target_offset]
                    ; b =>end
                    ; fallthrough:
                );
            }
        },
    }
}
