//! State of the ToyVM
//!
//! Two 32-bit registers, a program counter and 65536 memory cells. Every
//! run owns a fresh, zeroed instance.

use super::instruction::Register;

/// Number of memory cells
pub const MEMORY_CELLS: usize = 1 << 16;

/// Flat memory, one `u32` per cell, heap-owned
///
/// Indexed by `u16`, so every access is in range.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    cells: Box<[u32]>,
}

impl Memory {
    /// Zeroed memory
    pub fn new() -> Self {
        Self {
            cells: vec![0u32; MEMORY_CELLS].into_boxed_slice(),
        }
    }

    #[inline(always)]
    pub fn get(&self, index: u16) -> u32 {
        self.cells[usize::from(index)]
    }

    #[inline(always)]
    pub fn set(&mut self, index: u16, value: u32) {
        self.cells[usize::from(index)] = value;
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.cells
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut u32 {
        self.cells.as_mut_ptr()
    }

    /// Zeroes every cell
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.cells.iter().filter(|&&c| c != 0).count();
        f.debug_struct("Memory")
            .field("cells", &MEMORY_CELLS)
            .field("non_zero", &used)
            .field("head", &&self.cells[..3])
            .finish()
    }
}

/// Registers, pc and memory of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmState {
    pub registers: [u32; 2],
    /// Index of the next instruction
    pub pc: usize,
    pub memory: Memory,
}

impl VmState {
    /// Fresh, zeroed state
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn register(&self, reg: Register) -> u32 {
        self.registers[reg.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state_is_zeroed() {
        let state = VmState::new();
        assert_eq!(state.registers, [0, 0]);
        assert_eq!(state.pc, 0);
        assert_eq!(state.memory.as_slice().len(), MEMORY_CELLS);
        assert!(state.memory.as_slice().iter().all(|&c| c == 0));
    }

    #[test]
    fn test_memory_full_range() {
        let mut mem = Memory::new();
        mem.set(0xFFFF, 7);
        mem.set(0, 1);
        assert_eq!(mem.get(0xFFFF), 7);
        assert_eq!(mem.get(0), 1);

        mem.clear();
        assert_eq!(mem.get(0xFFFF), 0);
    }
}
