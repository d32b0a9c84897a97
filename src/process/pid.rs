use bit_field::BitField;
use core::fmt;

use crate::config::{
    KERNEL_DATA_SELECTOR, KERNEL_STACK_SIZE, LARGE_PAGE_SIZE, MAX_PROCESSES, PROCESS_MEMORY_BASE,
};
use crate::cpu::KernelStack;
use crate::error::{KResult, KernelError};

/// Process id. Doubles as the index of every statically addressed
/// per-process resource: memory slot, kernel stack, control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u8);

impl Pid {
    pub fn new(index: usize) -> Option<Self> {
        (index < MAX_PROCESSES).then_some(Pid(index as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Physical 4 MiB slot backing this process's window.
    pub fn physical_base(self) -> u32 {
        PROCESS_MEMORY_BASE + self.0 as u32 * LARGE_PAGE_SIZE
    }

    /// Kernel stacks grow down from the top of the kernel page, one 8 KiB
    /// slot per pid.
    pub fn kernel_stack(self) -> KernelStack {
        KernelStack {
            ss0: KERNEL_DATA_SELECTOR,
            esp0: PROCESS_MEMORY_BASE - KERNEL_STACK_SIZE * self.0 as u32 - 4,
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-use bitmap, one bit per pid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PidRegistry {
    bits: u32,
}

impl PidRegistry {
    pub const fn new() -> Self {
        PidRegistry { bits: 0 }
    }

    /// Lowest free pid.
    pub fn allocate(&mut self) -> KResult<Pid> {
        let index = (0..MAX_PROCESSES)
            .find(|&i| !self.bits.get_bit(i))
            .ok_or(KernelError::ResourceExhausted)?;
        self.bits.set_bit(index, true);
        Ok(Pid(index as u8))
    }

    pub fn release(&mut self, pid: Pid) {
        self.bits.set_bit(pid.index(), false);
    }

    pub fn is_allocated(&self, pid: Pid) -> bool {
        self.bits.get_bit(pid.index())
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones() as usize
    }
}
