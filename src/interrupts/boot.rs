//! Boot entry and the hooks the platform's interrupt handlers call.
//!
//! Interrupt hooks may never return: a tick or a terminal switch hands the
//! CPU to another process's stack. Handlers therefore acknowledge the
//! controller before calling in.

use core::ptr;
use core::slice;
use multiboot2::{BootInformation, BootInformationHeader};
use spin::Mutex;

use super::cpu::X86Cpu;
use super::devices::{DriverTable, Drivers};
use super::gdt;
use super::usermode::{perform, save_slot};
use crate::config::{KernelConfig, KERNEL_BASE, LARGE_PAGE_SIZE};
use crate::drivers::TerminalId;
use crate::fs::BootFs;
use crate::kernel::Kernel;
use crate::process::ExitStatus;
use crate::scheduler::context::Transfer;

pub type HwKernel = Kernel<X86Cpu, BootFs<'static>, Drivers>;

/// Built at compile time. Until `kernel_main` attaches the boot module and
/// the drivers it has no processes, so every hook finds nothing to do.
static KERNEL: Mutex<HwKernel> = Mutex::new(Kernel::new(
    X86Cpu::new(),
    BootFs::empty(),
    Drivers::unbound(),
    KernelConfig::new(),
));

pub fn kernel() -> &'static Mutex<HwKernel> {
    &KERNEL
}

/// The boot file system: the first multiboot module. It has to lie inside the
/// kernel page, the only low memory that stays mapped once paging is on.
fn boot_module(multiboot_info: u32) -> &'static [u8] {
    let info = match unsafe { BootInformation::load(multiboot_info as usize as *const BootInformationHeader) } {
        Ok(info) => info,
        Err(e) => {
            crate::log_error!("boot: bad multiboot information: {:?}", e);
            panic!("no multiboot information");
        }
    };
    let Some(module) = info.module_tags().next() else {
        crate::log_error!("boot: no file system module");
        panic!("no boot module");
    };
    let (start, end) = (module.start_address(), module.end_address());
    if start < KERNEL_BASE || end > KERNEL_BASE + LARGE_PAGE_SIZE || end < start {
        crate::log_error!("boot: module at {:#x}..{:#x} is outside the kernel page", start, end);
        panic!("unmapped boot module");
    }
    crate::log_info!("boot: file system module at {:#x}, {} bytes", start, end - start);
    unsafe { slice::from_raw_parts(start as usize as *const u8, (end - start) as usize) }
}

/// Called by the platform's multiboot stub with interrupts off.
#[no_mangle]
pub extern "C" fn kernel_main(multiboot_info: u32, drivers: &'static DriverTable) -> ! {
    crate::serial::init();
    gdt::init();
    crate::log_info!("tri_term starting");

    let fs = match BootFs::new(boot_module(multiboot_info)) {
        Ok(fs) => fs,
        Err(e) => {
            crate::log_error!("boot: file system image rejected: {}", e);
            panic!("bad boot file system");
        }
    };
    let mut kernel = KERNEL.lock();
    kernel.fs = fs;
    kernel.devices.bind(drivers);
    let transfer = match kernel.boot() {
        Ok(transfer) => transfer,
        Err(e) => {
            crate::log_error!("boot: cannot start the first shell: {}", e);
            panic!("boot failed");
        }
    };
    drop(kernel);
    unsafe { perform(ptr::null_mut(), transfer.target) };
    crate::log_error!("boot: the first shell returned");
    panic!("boot transfer returned");
}

/// Run `op` under the kernel lock and carry out the transfer it asks for.
/// A hook that finds the kernel busy does nothing.
fn with_kernel<F>(hook: &str, op: F)
where
    F: FnOnce(&mut HwKernel) -> Option<Transfer>,
{
    let Some(mut guard) = KERNEL.try_lock() else {
        crate::log_debug!("{}: kernel busy", hook);
        return;
    };
    let Some(transfer) = op(&mut guard) else {
        return;
    };
    let save = save_slot(&mut guard, transfer.save);
    drop(guard);
    unsafe { perform(save, transfer.target) };
}

/// Timer interrupt.
#[no_mangle]
pub extern "C" fn on_timer_tick() {
    with_kernel("tick", |kernel| kernel.tick());
}

/// Alt+F1..F3.
#[no_mangle]
pub extern "C" fn on_foreground_key(terminal: u8) {
    let Some(target) = TerminalId::new(terminal as usize) else {
        crate::log_warn!("tty: no terminal {}", terminal);
        return;
    };
    with_kernel("switch", |kernel| match kernel.switch_foreground(target) {
        Ok(transfer) => transfer,
        Err(e) => {
            crate::log_warn!("tty: switch to {} failed: {}", target, e);
            None
        }
    });
}

/// Ctrl+C.
#[no_mangle]
pub extern "C" fn on_cancel_key() {
    with_kernel("cancel", |kernel| kernel.cancel());
}

/// An exception raised by user code. The process dies with the fault status.
#[no_mangle]
pub extern "C" fn on_fault(vector: u32) -> ! {
    crate::log_warn!("fault: exception {} in user mode", vector);
    with_kernel("fault", |kernel| match kernel.halt(ExitStatus::Fault) {
        Ok(transfer) => Some(transfer),
        Err(e) => {
            crate::log_error!("fault: no process to terminate: {}", e);
            None
        }
    });
    crate::log_error!("fault: exception {} could not be handled", vector);
    panic!("unhandled exception");
}
