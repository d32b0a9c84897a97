//! The 32-bit x86 backend: everything that has to touch privileged state or
//! jump between stacks. The interrupt controller and the IDT belong to the
//! platform code that links this crate; it installs [`usermode::syscall_entry`]
//! at vector 0x80 and calls the `on_*` hooks in [`boot`].

pub mod boot;
pub mod cpu;
pub mod devices;
pub mod gdt;
pub mod port;
pub mod usermode;

use core::arch::asm;

/// EFLAGS.IF
const INTERRUPT_FLAG: u32 = 1 << 9;

pub fn are_enabled() -> bool {
    let eflags: u32;
    unsafe { asm!("pushfd", "pop {}", out(reg) eflags, options(nomem, preserves_flags)) };
    eflags & INTERRUPT_FLAG != 0
}

pub fn enable() {
    unsafe { asm!("sti", options(nomem, nostack)) };
}

pub fn disable() {
    unsafe { asm!("cli", options(nomem, nostack)) };
}

/// Sleep until the next interrupt.
pub fn halt() {
    unsafe { asm!("hlt", options(nomem, nostack, preserves_flags)) };
}
