pub mod paging;

use bit_field::BitField;

use crate::config::{PAGE_SIZE, USER_WINDOW_BASE, USER_WINDOW_END, VIDMAP_ADDR};
use crate::error::{KResult, KernelError};

pub use paging::{AddressSpace, Entry, EntryFlags, PageDirectory, PageTable};

/// Page-directory slot covering `addr`.
pub fn directory_index(addr: u32) -> usize {
    addr.get_bits(22..32) as usize
}

/// Page-table slot covering `addr` within its 4 MiB region.
pub fn table_index(addr: u32) -> usize {
    addr.get_bits(12..22) as usize
}

/// Bytes between `addr` and the end of the user-accessible region holding it.
/// User code can only ever reach the process window and the vidmap page.
pub fn user_span(addr: u32) -> KResult<usize> {
    if (USER_WINDOW_BASE..USER_WINDOW_END).contains(&addr) {
        Ok((USER_WINDOW_END - addr) as usize)
    } else if (VIDMAP_ADDR..VIDMAP_ADDR + PAGE_SIZE).contains(&addr) {
        Ok((VIDMAP_ADDR + PAGE_SIZE - addr) as usize)
    } else {
        Err(KernelError::InvalidArgument)
    }
}

/// Reject any user range that leaves its region.
pub fn check_user_range(addr: u32, len: usize) -> KResult<()> {
    if len <= user_span(addr)? {
        Ok(())
    } else {
        Err(KernelError::InvalidArgument)
    }
}

/// True when the whole range lies inside the process window proper.
pub fn in_user_window(addr: u32, len: usize) -> bool {
    (USER_WINDOW_BASE..USER_WINDOW_END).contains(&addr)
        && len <= (USER_WINDOW_END - addr) as usize
}
