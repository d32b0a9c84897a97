//! The read-only boot file system, handed to the kernel as a boot module.
//!
//! Layout, in 4 KiB blocks: the boot block (entry counts and up to 63 directory
//! entries), one block per inode, then the data blocks. An inode is its length
//! followed by the indices of the data blocks holding the file, in order.

use super::{Dentry, FileSystem, FileType};
use crate::config::FILE_NAME_MAX;
use crate::error::{KResult, KernelError};

pub const BLOCK_SIZE: usize = 4096;
pub const DENTRY_SIZE: usize = 64;
pub const MAX_DENTRIES: u32 = 63;
/// Directory entries start after the three counts and 52 reserved bytes.
const DENTRY_BASE: usize = 64;
const DENTRY_TYPE: usize = 32;
const DENTRY_INODE: usize = 36;
/// Data-block indices that fit in an inode after its length word.
const INODE_SLOTS: usize = BLOCK_SIZE / 4 - 1;

#[derive(Debug, Clone, Copy)]
pub struct BootFs<'a> {
    image: &'a [u8],
    dentries: u32,
    inodes: u32,
    data_blocks: u32,
}

impl<'a> BootFs<'a> {
    /// Check the boot block against the image size.
    pub fn new(image: &'a [u8]) -> KResult<Self> {
        let dentries = read_u32(image, 0)?;
        let inodes = read_u32(image, 4)?;
        let data_blocks = read_u32(image, 8)?;
        if dentries > MAX_DENTRIES {
            return Err(KernelError::Corrupt);
        }
        let blocks = 1 + inodes as usize + data_blocks as usize;
        if blocks.checked_mul(BLOCK_SIZE).map_or(true, |len| len > image.len()) {
            return Err(KernelError::Corrupt);
        }
        Ok(BootFs {
            image,
            dentries,
            inodes,
            data_blocks,
        })
    }

    /// A file system with no entries, until the boot module is found.
    pub const fn empty() -> Self {
        BootFs {
            image: &[],
            dentries: 0,
            inodes: 0,
            data_blocks: 0,
        }
    }

    pub fn dentry_count(&self) -> u32 {
        self.dentries
    }

    fn inode_block(&self, inode: u32) -> KResult<usize> {
        if inode >= self.inodes {
            return Err(KernelError::InvalidArgument);
        }
        Ok((1 + inode as usize) * BLOCK_SIZE)
    }

    fn data_block(&self, index: u32) -> KResult<&'a [u8]> {
        if index >= self.data_blocks {
            return Err(KernelError::Corrupt);
        }
        let start = (1 + self.inodes as usize + index as usize) * BLOCK_SIZE;
        self.image
            .get(start..start + BLOCK_SIZE)
            .ok_or(KernelError::Corrupt)
    }
}

impl FileSystem for BootFs<'_> {
    fn lookup_by_name(&self, name: &[u8]) -> KResult<Dentry> {
        if name.is_empty() || name.len() > FILE_NAME_MAX {
            return Err(KernelError::NotFound);
        }
        (0..self.dentries)
            .filter_map(|i| self.lookup_by_index(i).ok())
            .find(|dentry| dentry.name() == name)
            .ok_or(KernelError::NotFound)
    }

    fn lookup_by_index(&self, index: u32) -> KResult<Dentry> {
        if index >= self.dentries {
            return Err(KernelError::NotFound);
        }
        let base = DENTRY_BASE + index as usize * DENTRY_SIZE;
        let name = self
            .image
            .get(base..base + FILE_NAME_MAX)
            .ok_or(KernelError::Corrupt)?;
        let file_type = FileType::from_raw(read_u32(self.image, base + DENTRY_TYPE)?)?;
        let inode = read_u32(self.image, base + DENTRY_INODE)?;
        if file_type == FileType::Regular && inode >= self.inodes {
            return Err(KernelError::Corrupt);
        }
        Ok(Dentry::new(name, file_type, inode))
    }

    fn read_bytes(&self, inode: u32, offset: u32, buf: &mut [u8]) -> KResult<usize> {
        let block = self.inode_block(inode)?;
        let length = read_u32(self.image, block)?;
        if offset >= length {
            return Ok(0);
        }
        let total = buf.len().min((length - offset) as usize);
        let mut copied = 0;
        while copied < total {
            let position = offset as usize + copied;
            let slot = position / BLOCK_SIZE;
            if slot >= INODE_SLOTS {
                return Err(KernelError::Corrupt);
            }
            let index = read_u32(self.image, block + 4 + slot * 4)?;
            let data = self.data_block(index)?;
            let within = position % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - within).min(total - copied);
            buf[copied..copied + chunk].copy_from_slice(&data[within..within + chunk]);
            copied += chunk;
        }
        Ok(copied)
    }

    fn file_size(&self, inode: u32) -> KResult<u32> {
        read_u32(self.image, self.inode_block(inode)?)
    }
}

fn read_u32(image: &[u8], offset: usize) -> KResult<u32> {
    let bytes = image.get(offset..offset + 4).ok_or(KernelError::Corrupt)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
