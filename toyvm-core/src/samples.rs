//! Sample programs
//!
//! The Fibonacci loop below is the benchmark workload: `n` iterations of
//! `t = c; c += p; p = t`, starting from `p = c = 1`, then `vput A`.
//!
//! | location | role                 |
//! |----------|----------------------|
//! | A        | `c`, current term    |
//! | B        | scratch              |
//! | mem[0]   | `p`, previous term   |
//! | mem[1]   | `t`, temporary       |
//! | mem[2]   | `n`, remaining count |

use crate::vm::{EncodingError, Program, Register::*};

/// Builds the Fibonacci program for `n` iterations
///
/// Prints the `(n + 2)`-th term, wrapping modulo 2^32. `n` must fit in the
/// 16-bit immediate. `n = 0` behaves like the loop counter wrapped: the
/// loop runs 2^32 times.
pub fn fibonacci(n: u32) -> Result<Program, EncodingError> {
    let mut p = Program::new();

    p.load_immediate(A, 1)?      // c
        .store(A, 0)?            // p = 1
        .load_immediate(B, n)?
        .store(B, 2)?;           // n

    p.set_mark();
    p.store(A, 1)?               // t = c
        .add(A, 0)?              // c += p
        .load(B, 1)?
        .store(B, 0)?            // p = t
        .load(B, 2)?
        .subtract_immediate(B, 1)?
        .store(B, 2)?;           // n--
    p.jump_if_non_zero(B, p.mark_offset())?;
    p.print(A);

    Ok(p)
}

/// Same loop in Rust, for comparison
#[inline(never)]
pub fn fibonacci_native(mut n: u32) -> u32 {
    let mut p: u32 = 1;
    let mut c: u32 = 1;
    loop {
        let t = c;
        c = c.wrapping_add(p);
        p = t;
        n = n.wrapping_sub(1);
        if n == 0 {
            return c;
        }
    }
}
