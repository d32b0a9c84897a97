#![cfg_attr(not(test), no_std)]

pub mod serial;
pub mod config;
pub mod error;
pub mod cpu;
pub mod sync;
pub mod memory;
pub mod fs;
pub mod drivers;
pub mod process;
pub mod loader;
pub mod scheduler;
pub mod syscalls;
pub mod kernel;

#[cfg(target_arch = "x86")]
pub mod interrupts;

#[cfg(test)]
pub(crate) mod sim;

pub use error::{KResult, KernelError};
pub use kernel::Kernel;

#[cfg(not(test))]
use core::panic::PanicInfo;

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log_error!("{}", info);
    loop {
        #[cfg(target_arch = "x86")]
        interrupts::halt();
        #[cfg(not(target_arch = "x86"))]
        core::hint::spin_loop();
    }
}
