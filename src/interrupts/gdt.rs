//! Flat 32-bit segments and the single task state segment, whose only live
//! fields are the ring 0 stack the CPU switches to on a trap from user mode.

use bit_field::BitField;
use core::arch::asm;
use core::cell::UnsafeCell;
use core::mem::size_of;
use x86_64::structures::gdt::DescriptorFlags;

use crate::config::KERNEL_DATA_SELECTOR;
use crate::cpu::KernelStack;

pub const KERNEL_CODE_SELECTOR: u16 = 0x10;
pub const TSS_SELECTOR: u16 = 0x30;

const GDT_ENTRIES: usize = 7;
/// Type of an available 32-bit TSS descriptor.
const TSS_AVAILABLE: u64 = 0x9;

#[repr(C)]
struct TaskState {
    link: u32,
    esp0: u32,
    ss0: u32,
    unused: [u32; 22],
    trap: u16,
    iomap_base: u16,
}

struct Shared<T>(UnsafeCell<T>);

// Only touched with interrupts disabled on the one CPU.
unsafe impl<T> Sync for Shared<T> {}

static TSS: Shared<TaskState> = Shared(UnsafeCell::new(TaskState {
    link: 0,
    esp0: 0,
    ss0: KERNEL_DATA_SELECTOR as u32,
    unused: [0; 22],
    trap: 0,
    iomap_base: size_of::<TaskState>() as u16,
}));

static GDT: Shared<[u64; GDT_ENTRIES]> = Shared(UnsafeCell::new([0; GDT_ENTRIES]));

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

fn tss_descriptor(base: u32, limit: u32) -> u64 {
    let mut descriptor = 0u64;
    descriptor.set_bits(0..16, limit.get_bits(0..16) as u64);
    descriptor.set_bits(16..40, base.get_bits(0..24) as u64);
    descriptor.set_bits(40..44, TSS_AVAILABLE);
    descriptor.set_bit(47, true);
    descriptor.set_bits(48..52, limit.get_bits(16..20) as u64);
    descriptor.set_bits(56..64, base.get_bits(24..32) as u64);
    descriptor
}

/// Install the kernel's descriptor table and task register. Slots: null,
/// unused, kernel code 0x10, kernel data 0x18, user code 0x23, user data
/// 0x2B, TSS 0x30.
pub fn init() {
    let tss_base = TSS.0.get() as u32;
    let table = [
        0,
        0,
        DescriptorFlags::KERNEL_CODE32.bits(),
        DescriptorFlags::KERNEL_DATA.bits(),
        DescriptorFlags::USER_CODE32.bits(),
        DescriptorFlags::USER_DATA.bits(),
        tss_descriptor(tss_base, size_of::<TaskState>() as u32 - 1),
    ];
    unsafe {
        *GDT.0.get() = table;
        let pointer = DescriptorTablePointer {
            limit: (size_of::<[u64; GDT_ENTRIES]>() - 1) as u16,
            base: GDT.0.get() as u32,
        };
        asm!("lgdt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
        asm!(
            "push {code}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            "mov ds, {data:x}",
            "mov es, {data:x}",
            "mov fs, {data:x}",
            "mov gs, {data:x}",
            "mov ss, {data:x}",
            code = const KERNEL_CODE_SELECTOR as u32,
            data = in(reg) KERNEL_DATA_SELECTOR as u32,
            tmp = out(reg) _,
        );
        asm!("ltr {0:x}", in(reg) TSS_SELECTOR, options(nostack, preserves_flags));
    }
}

pub fn kernel_stack() -> KernelStack {
    let tss = unsafe { &*TSS.0.get() };
    KernelStack {
        ss0: tss.ss0 as u16,
        esp0: tss.esp0,
    }
}

/// Callers hold interrupts off: the CPU reads these fields on every trap.
pub fn set_kernel_stack(stack: KernelStack) {
    unsafe {
        let tss = &mut *TSS.0.get();
        tss.ss0 = stack.ss0 as u32;
        tss.esp0 = stack.esp0;
    }
}
