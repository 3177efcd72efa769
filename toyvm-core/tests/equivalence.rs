//! Interpreter and compiled routine must agree on registers, memory and
//! printed output for the same program.

#![cfg(all(feature = "jit", any(target_arch = "x86_64", target_arch = "aarch64")))]

use toyvm_core::prelude::*;
use toyvm_core::vm::Register::{A, B};
use toyvm_core::vm::{format_register, CodegenError, MAX_CACHED_CELLS};

fn interpret(program: &Program) -> (VmState, Vec<u8>) {
    let mut out = Vec::new();
    let state = Interpreter::new(program).run_with_output(&mut out).unwrap();
    (state, out)
}

fn compile(program: &Program, cached_cells: usize) -> (NativeRoutine, Vec<u8>) {
    let mut compiler = JitCompiler::new(JitConfig { cached_cells }).unwrap();
    let mut routine = compiler.compile(program).unwrap();
    let mut out = Vec::new();
    routine.invoke_with_output(&mut out).unwrap();
    (routine, out)
}

fn assert_equivalent(program: &Program) {
    let (state, expected) = interpret(program);
    for cached_cells in 0..=MAX_CACHED_CELLS {
        let (routine, out) = compile(program, cached_cells);
        assert_eq!(
            String::from_utf8_lossy(&out),
            String::from_utf8_lossy(&expected),
            "output, cached_cells = {cached_cells}"
        );
        assert_eq!(routine.registers(), state.registers, "registers, cached_cells = {cached_cells}");
        assert!(
            routine.memory() == &state.memory,
            "memory differs, cached_cells = {cached_cells}"
        );
    }
}

#[test]
fn test_fibonacci_matches_native() {
    for n in [1u32, 2, 10, 46, 1000] {
        let program = samples::fibonacci(n).unwrap();
        let expected = samples::fibonacci_native(n);

        let (state, _) = interpret(&program);
        assert_eq!(state.register(A), expected, "interpreter, n = {n}");

        let (routine, out) = compile(&program, 3);
        assert_eq!(routine.register(A), expected, "jit, n = {n}");
        assert_eq!(out, format!("{}\n", format_register(A, expected)).into_bytes());
    }
}

#[test]
fn test_fibonacci_ten() {
    let program = samples::fibonacci(10).unwrap();
    let (_, out) = compile(&program, 3);
    assert_eq!(out, b"A      144(0x00000090)\n");
    assert_equivalent(&program);
}

#[test]
fn test_every_opcode() {
    let mut p = Program::new();
    p.load_immediate(A, 0xFFFF).unwrap()
        .store(A, 0).unwrap()
        .store(A, 3).unwrap()
        .add_immediate(A, 0x8001).unwrap()
        .load_immediate(B, 7).unwrap()
        .store(B, 1).unwrap()
        .add(B, 0).unwrap()
        .add(B, 3).unwrap()
        .subtract(A, 1).unwrap()
        .subtract(A, 0xFFFF).unwrap()
        .subtract_immediate(B, 0xFFFF).unwrap()
        .store(B, 2).unwrap()
        .load(A, 2).unwrap()
        .load(B, 3).unwrap()
        .print(A)
        .print(B)
        .jump_if_non_zero(A, 1).unwrap()
        .print(A)
        .print(B);
    assert_equivalent(&p);
}

#[test]
fn test_wraparound() {
    let mut p = Program::new();
    p.subtract_immediate(A, 1).unwrap()
        .print(A)
        .store(A, 2).unwrap()
        .add(A, 2).unwrap()
        .print(A)
        .subtract(B, 2).unwrap()
        .print(B)
        .load_immediate(A, 0x8000).unwrap()
        .store(A, 1).unwrap();
    // 0x8000 doubled 17 times wraps to zero
    for _ in 0..17 {
        p.add(A, 1).unwrap().store(A, 1).unwrap();
    }
    p.print(A);
    assert_equivalent(&p);

    let (state, out) = interpret(&p);
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("A       -1(0xffffffff)\nA       -2(0xfffffffe)\n"));
    assert_eq!(state.register(A), 0);
}

#[test]
fn test_print_unloaded_registers() {
    let mut p = Program::new();
    p.print(A).print(B);
    assert_equivalent(&p);
    let (_, out) = compile(&p, 3);
    assert_eq!(out, b"A        0(0x00000000)\nB        0(0x00000000)\n");
}

#[test]
fn test_high_memory_cells() {
    let mut p = Program::new();
    p.load_immediate(A, 3).unwrap().store(A, 0xFFFF).unwrap();
    p.set_mark();
    p.load(B, 0xFFFF).unwrap()
        .add(B, 0x8000).unwrap()
        .store(B, 0x8000).unwrap()
        .load(A, 0xFFFF).unwrap()
        .subtract_immediate(A, 1).unwrap()
        .store(A, 0xFFFF).unwrap();
    p.jump_if_non_zero(A, p.mark_offset()).unwrap();
    p.print(B);
    assert_equivalent(&p);
}

#[test]
fn test_jump_to_end_terminates() {
    let mut p = Program::new();
    p.load_immediate(A, 1).unwrap()
        .jump_if_non_zero(A, 1).unwrap()
        .print(A);
    assert_equivalent(&p);
    let (_, out) = compile(&p, 3);
    assert!(out.is_empty());
}

#[test]
fn test_out_of_range_jump_fails_in_both_engines() {
    let mut p = Program::new();
    p.load_immediate(B, 2).unwrap()
        .print(B)
        .jump_if_non_zero(B, -10).unwrap();

    let err = Interpreter::new(&p).run_with_output(&mut Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        VmError::Program(ProgramError::JumpOutOfRange { pc: 2, target: -7, len: 3 })
    ));

    let mut routine = JitCompiler::new(JitConfig::default()).unwrap().compile(&p).unwrap();
    let mut out = Vec::new();
    let err = routine.invoke_with_output(&mut out).unwrap_err();
    assert!(matches!(
        err,
        VmError::Program(ProgramError::JumpOutOfRange { pc: 2, target: -7, len: 3 })
    ));
    assert_eq!(out, b"B        2(0x00000002)\n");
}

#[test]
fn test_invalid_words_are_rejected() {
    let err = Program::from_words(vec![0x0100_0001, 0x0900_0000]).unwrap_err();
    assert!(matches!(err, EncodingError::InvalidOpcode { opcode: 9, .. }));

    let err = JitCompiler::new(JitConfig { cached_cells: MAX_CACHED_CELLS + 1 }).unwrap_err();
    assert!(matches!(err, VmError::Codegen(CodegenError::TooManyCachedCells { .. })));
}

#[test]
fn test_from_words_runs_identically() {
    let built = samples::fibonacci(20).unwrap();
    let loaded = Program::from_words(built.words().to_vec()).unwrap();
    let (state, out) = interpret(&loaded);
    assert_eq!(state.register(A), samples::fibonacci_native(20));
    assert_eq!(out, interpret(&built).1);
    assert_equivalent(&loaded);
}
