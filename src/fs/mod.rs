pub mod bootfs;
pub mod fd;

use crate::config::FILE_NAME_MAX;
use crate::error::{KResult, KernelError};

pub use bootfs::BootFs;
pub use fd::{FdTable, FileDescriptor, FileOps, IoContext};

/// File type tag stored in every directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Rtc,
    Directory,
    Regular,
}

impl FileType {
    pub fn from_raw(raw: u32) -> KResult<Self> {
        match raw {
            0 => Ok(FileType::Rtc),
            1 => Ok(FileType::Directory),
            2 => Ok(FileType::Regular),
            _ => Err(KernelError::Corrupt),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            FileType::Rtc => 0,
            FileType::Directory => 1,
            FileType::Regular => 2,
        }
    }
}

/// A directory entry: a name bound to a type and an inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dentry {
    name: [u8; FILE_NAME_MAX],
    pub file_type: FileType,
    pub inode: u32,
}

impl Dentry {
    pub fn new(name: &[u8], file_type: FileType, inode: u32) -> Self {
        let mut buf = [0u8; FILE_NAME_MAX];
        let len = name.len().min(FILE_NAME_MAX);
        buf[..len].copy_from_slice(&name[..len]);
        Dentry {
            name: buf,
            file_type,
            inode,
        }
    }

    /// The name without NUL padding. A full 32-byte name has no terminator.
    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(FILE_NAME_MAX);
        &self.name[..len]
    }
}

/// The file system collaborator every descriptor and the loader read through.
pub trait FileSystem {
    fn lookup_by_name(&self, name: &[u8]) -> KResult<Dentry>;

    /// The `index`-th directory entry; `NotFound` past the last one.
    fn lookup_by_index(&self, index: u32) -> KResult<Dentry>;

    /// Copy file bytes starting at `offset` into `buf`. Returns the number of
    /// bytes copied, 0 at or past end of file.
    fn read_bytes(&self, inode: u32, offset: u32, buf: &mut [u8]) -> KResult<usize>;

    fn file_size(&self, inode: u32) -> KResult<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dentry_name_strips_padding() {
        let dentry = Dentry::new(b"frame0.txt", FileType::Regular, 3);
        assert_eq!(dentry.name(), b"frame0.txt");

        let long = [b'a'; 40];
        let dentry = Dentry::new(&long, FileType::Regular, 0);
        assert_eq!(dentry.name().len(), FILE_NAME_MAX);
    }

    #[test]
    fn file_type_tags() {
        assert_eq!(FileType::from_raw(0), Ok(FileType::Rtc));
        assert_eq!(FileType::from_raw(2), Ok(FileType::Regular));
        assert_eq!(FileType::from_raw(7), Err(KernelError::Corrupt));
        assert_eq!(FileType::Directory.raw(), 1);
    }
}
