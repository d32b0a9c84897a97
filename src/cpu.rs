use crate::error::KResult;
use crate::memory::paging::AddressSpace;

/// The privilege-0 stack fields of the task state segment: where the CPU
/// switches stacks when user code traps into the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelStack {
    pub ss0: u16,
    pub esp0: u32,
}

/// Privileged CPU state the core manipulates. The bare-metal backend lives in
/// `interrupts`; tests drive the kernel through a software model.
pub trait Cpu {
    /// Install `space` as the active page directory. Writing the directory
    /// base register is also the translation-cache flush.
    fn load_page_directory(&mut self, space: &AddressSpace);

    fn kernel_stack(&self) -> KernelStack;
    fn set_kernel_stack(&mut self, stack: KernelStack);

    /// Mask interrupts, returning whether they were enabled before.
    fn disable_interrupts(&mut self) -> bool;
    fn restore_interrupts(&mut self, enabled: bool);

    /// View `len` bytes of user memory at `addr` through the installed mapping.
    /// The range must sit entirely inside the process window or the vidmap page.
    fn user_slice(&self, addr: u32, len: usize) -> KResult<&[u8]>;
    fn user_slice_mut(&mut self, addr: u32, len: usize) -> KResult<&mut [u8]>;

    /// Copy between identity-mapped low-memory pages (screen save/restore).
    fn copy_physical(&mut self, dst: u32, src: u32, len: usize);
}
