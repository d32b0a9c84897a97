//! Fixed memory layout and kernel-wide limits.
//!
//! Every address here is part of the user ABI or the boot contract, so none of
//! them may change without rebuilding the user programs and the boot image.

/// 4 KiB page.
pub const PAGE_SIZE: u32 = 4096;
/// 4 MiB page (PSE).
pub const LARGE_PAGE_SIZE: u32 = 4 * 1024 * 1024;
pub const ENTRIES_PER_TABLE: usize = 1024;

/// The kernel image is mapped 1:1 as a single global large page.
pub const KERNEL_BASE: u32 = 4 * 1024 * 1024;

/// Physical base of the per-process memory slots; pid `n` owns
/// `PROCESS_MEMORY_BASE + n * LARGE_PAGE_SIZE`.
pub const PROCESS_MEMORY_BASE: u32 = 8 * 1024 * 1024;

/// The process window: the one virtual large page every user program lives in.
pub const USER_WINDOW_BASE: u32 = 128 * 1024 * 1024;
pub const USER_WINDOW_END: u32 = USER_WINDOW_BASE + LARGE_PAGE_SIZE;
pub const PROGRAM_LOAD_ADDR: u32 = 0x0804_8000;
pub const USER_STACK_TOP: u32 = USER_WINDOW_END - 4;
/// Largest executable that fits between the load address and the end of the window.
pub const MAX_IMAGE_SIZE: u32 = USER_WINDOW_END - PROGRAM_LOAD_ADDR;

/// Where vidmap exposes the text-mode screen to user programs.
pub const VIDMAP_ADDR: u32 = USER_WINDOW_END;

pub const VIDEO_MEMORY: u32 = 0xB8000;
pub const VIDEO_BACKUPS: [u32; NUM_TERMINALS] = [0xB9000, 0xBA000, 0xBB000];

pub const KERNEL_STACK_SIZE: u32 = 8 * 1024;
pub const KERNEL_DATA_SELECTOR: u16 = 0x18;

pub const MAX_FILES: usize = 8;
pub const MAX_PROCESSES: usize = 6;
pub const NUM_TERMINALS: usize = 3;

/// Program names are at most 9 characters (10-byte buffer with terminator).
pub const PROGRAM_NAME_MAX: usize = 9;
/// Argument buffer including its terminator.
pub const ARG_BUFFER_SIZE: usize = 1024;
pub const FILE_NAME_MAX: usize = 32;

/// Halt status reported to a parent whose child died on an unhandled exception.
pub const FAULT_STATUS: i32 = 256;

/// Runtime knobs that are not part of the memory layout.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    /// Program launched as every terminal's root shell.
    pub shell: &'static str,
    /// Status a parent sees when its child was cancelled from the keyboard.
    pub cancel_status: u8,
}

impl KernelConfig {
    pub const fn new() -> Self {
        KernelConfig {
            shell: "shell",
            cancel_status: 1,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
