//! Two-level 32-bit paging with 4 MiB pages.
//!
//! One directory is live for the whole run. Slot 0 reaches low memory through
//! a page table that maps only the screen and its three backup pages, slot 1
//! is the kernel image, and the process window slot is rewritten on every
//! address-space switch. The vidmap page has a table of its own so it never
//! aliases the low-memory table.

use bit_field::BitField;
use bitflags::bitflags;
use core::fmt;
use core::ops::{Index, IndexMut};

use super::{directory_index, table_index};
use crate::config::{
    ENTRIES_PER_TABLE, KERNEL_BASE, LARGE_PAGE_SIZE, PAGE_SIZE, USER_WINDOW_BASE, VIDEO_BACKUPS,
    VIDEO_MEMORY,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        /// In a directory entry: this slot is one 4 MiB page.
        const LARGE         = 1 << 7;
        const GLOBAL        = 1 << 8;
    }
}

/// A directory or table entry: frame address in bits 12..32, flags below.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    pub const fn empty() -> Self {
        Entry(0)
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(EntryFlags::PRESENT)
    }

    pub fn flags(self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0)
    }

    pub fn address(self) -> u32 {
        self.0.get_bits(12..32) << 12
    }

    pub fn set(&mut self, address: u32, flags: EntryFlags) {
        let mut raw = flags.bits();
        raw.set_bits(12..32, address >> 12);
        self.0 = raw;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Entry({:#010x}, {:?})", self.address(), self.flags())
    }
}

macro_rules! entry_array {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        #[repr(C, align(4096))]
        pub struct $name {
            entries: [Entry; ENTRIES_PER_TABLE],
        }

        impl $name {
            pub const fn new() -> Self {
                $name { entries: [Entry::empty(); ENTRIES_PER_TABLE] }
            }

            pub fn iter(&self) -> impl Iterator<Item = &Entry> {
                self.entries.iter()
            }

            /// Address the MMU sees. Tables live in the identity-mapped
            /// kernel page, so the virtual address is the physical one.
            pub fn physical_address(&self) -> u32 {
                self as *const Self as usize as u32
            }
        }

        impl Index<usize> for $name {
            type Output = Entry;
            fn index(&self, index: usize) -> &Entry {
                &self.entries[index]
            }
        }

        impl IndexMut<usize> for $name {
            fn index_mut(&mut self, index: usize) -> &mut Entry {
                &mut self.entries[index]
            }
        }
    };
}

entry_array!(
    /// Top-level paging structure, loaded into CR3.
    PageDirectory
);
entry_array!(
    /// Second-level table of 4 KiB pages.
    PageTable
);

/// The address-space manager. It must not move once `init` has run, since
/// the directory records the physical addresses of its own tables.
#[derive(Clone)]
#[repr(C)]
pub struct AddressSpace {
    directory: PageDirectory,
    low_table: PageTable,
    video_table: PageTable,
    video_slot: Option<usize>,
}

impl AddressSpace {
    pub const fn new() -> Self {
        AddressSpace {
            directory: PageDirectory::new(),
            low_table: PageTable::new(),
            video_table: PageTable::new(),
            video_slot: None,
        }
    }

    /// Build the boot mappings: the screen pages through slot 0 and the
    /// kernel image as one global supervisor page in slot 1.
    pub fn init(&mut self) {
        self.directory = PageDirectory::new();
        self.low_table = PageTable::new();
        self.video_table = PageTable::new();
        self.video_slot = None;

        let screens = core::iter::once(VIDEO_MEMORY).chain(VIDEO_BACKUPS);
        for page in screens {
            self.low_table[table_index(page)].set(page, EntryFlags::PRESENT | EntryFlags::WRITABLE);
        }

        let low = self.low_table.physical_address();
        self.directory[0].set(low, EntryFlags::PRESENT | EntryFlags::WRITABLE);
        self.directory[directory_index(KERNEL_BASE)].set(
            KERNEL_BASE,
            EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::LARGE | EntryFlags::GLOBAL,
        );
    }

    /// Point the process window at `physical_base`. The caller reloads the
    /// directory to flush the stale translation.
    pub fn remap(&mut self, physical_base: u32) {
        self.directory[directory_index(USER_WINDOW_BASE)].set(
            physical_base,
            EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER | EntryFlags::LARGE,
        );
    }

    /// Map one user-accessible 4 KiB page at `virtual_addr`.
    pub fn remap_video(&mut self, virtual_addr: u32, physical_addr: u32) {
        let slot = directory_index(virtual_addr);
        let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER;
        self.video_table[table_index(virtual_addr)].set(physical_addr, flags);
        let table = self.video_table.physical_address();
        self.directory[slot].set(table, flags);
        self.video_slot = Some(slot);
    }

    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }

    /// Value for CR3.
    pub fn directory_base(&self) -> u32 {
        self.directory.physical_address()
    }

    /// The page table a present, non-large directory slot refers to.
    pub fn table_for(&self, slot: usize) -> Option<&PageTable> {
        match slot {
            0 => Some(&self.low_table),
            s if Some(s) == self.video_slot => Some(&self.video_table),
            _ => None,
        }
    }

    /// Walk the tables the way the MMU does.
    pub fn translate(&self, addr: u32) -> Option<u32> {
        self.walk(addr).map(|(phys, _)| phys)
    }

    /// Like `translate`, but only for pages user mode may touch.
    pub fn translate_user(&self, addr: u32) -> Option<u32> {
        match self.walk(addr) {
            Some((phys, true)) => Some(phys),
            _ => None,
        }
    }

    fn walk(&self, addr: u32) -> Option<(u32, bool)> {
        let slot = directory_index(addr);
        let pde = self.directory[slot];
        if !pde.is_present() {
            return None;
        }
        let user = pde.flags().contains(EntryFlags::USER);
        if pde.flags().contains(EntryFlags::LARGE) {
            return Some((pde.address() + (addr & (LARGE_PAGE_SIZE - 1)), user));
        }
        let pte = self.table_for(slot)?[table_index(addr)];
        if !pte.is_present() {
            return None;
        }
        let user = user && pte.flags().contains(EntryFlags::USER);
        Some((pte.address() + (addr & (PAGE_SIZE - 1)), user))
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}
