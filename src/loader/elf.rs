//! Executable check. Programs are flat images loaded whole at the load
//! address; only the magic and the entry point are read from the header.

use crate::config::MAX_IMAGE_SIZE;
use crate::error::{KResult, KernelError};
use crate::fs::FileSystem;

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
/// Byte offset of the little-endian entry point.
pub const ENTRY_POINT_OFFSET: u32 = 24;

/// What the loader needs to know about a program before committing a pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecImage {
    pub inode: u32,
    pub entry: u32,
    pub size: u32,
}

/// Check the magic and the size, and read the entry point.
pub fn inspect(fs: &dyn FileSystem, inode: u32) -> KResult<ExecImage> {
    let mut magic = [0u8; 4];
    if fs.read_bytes(inode, 0, &mut magic)? != magic.len() || magic != ELF_MAGIC {
        return Err(KernelError::NotExecutable);
    }

    let mut entry = [0u8; 4];
    if fs.read_bytes(inode, ENTRY_POINT_OFFSET, &mut entry)? != entry.len() {
        return Err(KernelError::NotExecutable);
    }

    let size = fs.file_size(inode)?;
    if size > MAX_IMAGE_SIZE {
        return Err(KernelError::NotExecutable);
    }

    Ok(ExecImage {
        inode,
        entry: u32::from_le_bytes(entry),
        size,
    })
}
