use core::arch::asm;
use core::slice;
use x86_64::registers::control::{Cr0Flags, Cr4Flags};

use super::gdt;
use crate::config::{USER_WINDOW_BASE, VIDMAP_ADDR};
use crate::cpu::{Cpu, KernelStack};
use crate::error::{KResult, KernelError};
use crate::memory::{self, AddressSpace};

/// The bare-metal [`Cpu`].
pub struct X86Cpu {
    paging: bool,
    window_present: bool,
    vidmap_present: bool,
}

impl X86Cpu {
    pub const fn new() -> Self {
        X86Cpu {
            paging: false,
            window_present: false,
            vidmap_present: false,
        }
    }

    /// Reject ranges the installed mapping would fault on.
    fn check_mapped(&self, addr: u32, len: usize) -> KResult<()> {
        memory::check_user_range(addr, len)?;
        let present = if addr >= VIDMAP_ADDR {
            self.vidmap_present
        } else {
            self.window_present
        };
        if present {
            Ok(())
        } else {
            Err(KernelError::Fault)
        }
    }
}

impl Default for X86Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for X86Cpu {
    fn load_page_directory(&mut self, space: &AddressSpace) {
        let base = space.directory_base();
        unsafe {
            if self.paging {
                asm!("mov cr3, {}", in(reg) base, options(nostack, preserves_flags));
            } else {
                let cr4 = (Cr4Flags::PAGE_SIZE_EXTENSION | Cr4Flags::PAGE_GLOBAL).bits() as u32;
                let cr0 = Cr0Flags::PAGING.bits() as u32;
                asm!(
                    "mov {tmp}, cr4",
                    "or {tmp}, {cr4}",
                    "mov cr4, {tmp}",
                    "mov cr3, {base}",
                    "mov {tmp}, cr0",
                    "or {tmp}, {cr0}",
                    "mov cr0, {tmp}",
                    base = in(reg) base,
                    cr4 = in(reg) cr4,
                    cr0 = in(reg) cr0,
                    tmp = out(reg) _,
                    options(nostack, preserves_flags),
                );
                self.paging = true;
            }
        }
        self.window_present = space.translate_user(USER_WINDOW_BASE).is_some();
        self.vidmap_present = space.translate_user(VIDMAP_ADDR).is_some();
    }

    fn kernel_stack(&self) -> KernelStack {
        gdt::kernel_stack()
    }

    fn set_kernel_stack(&mut self, stack: KernelStack) {
        gdt::set_kernel_stack(stack);
    }

    fn disable_interrupts(&mut self) -> bool {
        let enabled = super::are_enabled();
        super::disable();
        enabled
    }

    fn restore_interrupts(&mut self, enabled: bool) {
        if enabled {
            super::enable();
        }
    }

    fn user_slice(&self, addr: u32, len: usize) -> KResult<&[u8]> {
        self.check_mapped(addr, len)?;
        Ok(unsafe { slice::from_raw_parts(addr as usize as *const u8, len) })
    }

    fn user_slice_mut(&mut self, addr: u32, len: usize) -> KResult<&mut [u8]> {
        self.check_mapped(addr, len)?;
        Ok(unsafe { slice::from_raw_parts_mut(addr as usize as *mut u8, len) })
    }

    fn copy_physical(&mut self, dst: u32, src: u32, len: usize) {
        unsafe {
            core::ptr::copy_nonoverlapping(src as usize as *const u8, dst as usize as *mut u8, len);
        }
    }
}
