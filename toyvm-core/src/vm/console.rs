//! Output of `vput`
//!
//! One line per print: register letter, signed decimal right-justified to 8
//! columns, then the value as 8 hex digits, e.g. `A    10946(0x00002ac2)`.
//! Both execution modes go through [`write_register`], so their output is
//! byte-identical.

use std::io::{self, Write};

use super::instruction::Register;

/// Writes one print line
#[inline]
pub fn write_register<W: Write + ?Sized>(out: &mut W, reg: Register, value: u32) -> io::Result<()> {
    writeln!(out, "{} {:8}(0x{:08x})", reg.letter(), value as i32, value)
}

/// Print line as a string, without the newline
pub fn format_register(reg: Register, value: u32) -> String {
    format!("{} {:8}(0x{:08x})", reg.letter(), value as i32, value)
}

/// Output sink handed to native code
///
/// Native frames cannot unwind, so the first write error is kept and every
/// later print is dropped; [`finish`](Self::finish) reports it.
pub(crate) struct Console<'a> {
    out: &'a mut dyn Write,
    error: Option<io::Error>,
    lines: u64,
}

impl<'a> Console<'a> {
    pub(crate) fn new(out: &'a mut dyn Write) -> Self {
        Self { out, error: None, lines: 0 }
    }

    pub(crate) fn print(&mut self, reg: Register, value: u32) {
        if self.error.is_some() {
            return;
        }
        match write_register(&mut *self.out, reg, value) {
            Ok(()) => self.lines += 1,
            Err(e) => self.error = Some(e),
        }
    }

    /// Flushes and returns the number of lines written
    pub(crate) fn finish(self) -> io::Result<u64> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.lines)
    }
}
