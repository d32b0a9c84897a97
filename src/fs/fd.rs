//! Per-process descriptor tables and the operation tables bound into them.

use bitflags::bitflags;
use core::task::Poll;

use super::{FileSystem, FileType};
use crate::config::{FILE_NAME_MAX, MAX_FILES};
use crate::drivers::{Devices, TerminalId};
use crate::error::{KResult, KernelError};

pub const STDIN: usize = 0;
pub const STDOUT: usize = 1;

const RTC_MIN_HZ: u32 = 2;
const RTC_MAX_HZ: u32 = 1024;

/// What a descriptor operation may touch besides the descriptor itself.
pub struct IoContext<'a> {
    pub fs: &'a dyn FileSystem,
    pub devices: &'a mut dyn Devices,
    /// Terminal owning the calling process.
    pub terminal: TerminalId,
    pub foreground: bool,
}

/// The four entry points every descriptor dispatches through.
pub trait FileOps: Sync {
    fn open(&self, io: &mut IoContext<'_>, file: &mut FileDescriptor) -> KResult<()>;
    fn read(
        &self,
        io: &mut IoContext<'_>,
        file: &mut FileDescriptor,
        buf: &mut [u8],
    ) -> Poll<KResult<usize>>;
    fn write(&self, io: &mut IoContext<'_>, file: &mut FileDescriptor, buf: &[u8]) -> KResult<usize>;
    fn close(&self, io: &mut IoContext<'_>, file: &mut FileDescriptor) -> KResult<()>;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FdFlags: u32 {
        const IN_USE    = 1 << 0;
        /// stdin/stdout: close reports success and keeps the slot.
        const PERMANENT = 1 << 1;
    }
}

#[derive(Clone, Copy)]
pub struct FileDescriptor {
    ops: Option<&'static dyn FileOps>,
    pub inode: u32,
    /// Byte offset for files, entry index for the directory.
    pub position: u32,
    pub flags: FdFlags,
}

impl FileDescriptor {
    pub const fn closed() -> Self {
        FileDescriptor {
            ops: None,
            inode: 0,
            position: 0,
            flags: FdFlags::empty(),
        }
    }

    fn bound(ops: &'static dyn FileOps, inode: u32, flags: FdFlags) -> Self {
        FileDescriptor {
            ops: Some(ops),
            inode,
            position: 0,
            flags: flags | FdFlags::IN_USE,
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.flags.contains(FdFlags::IN_USE)
    }
}

impl core::fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("inode", &self.inode)
            .field("position", &self.position)
            .field("flags", &self.flags)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FdTable {
    files: [FileDescriptor; MAX_FILES],
}

impl FdTable {
    /// A fresh table with stdin and stdout wired up.
    pub fn new() -> Self {
        let mut files = [FileDescriptor::closed(); MAX_FILES];
        files[STDIN] = FileDescriptor::bound(&STDIN_OPS, 0, FdFlags::PERMANENT);
        files[STDOUT] = FileDescriptor::bound(&STDOUT_OPS, 0, FdFlags::PERMANENT);
        FdTable { files }
    }

    pub fn get(&self, fd: i32) -> KResult<&FileDescriptor> {
        let file = usize::try_from(fd)
            .ok()
            .and_then(|fd| self.files.get(fd))
            .ok_or(KernelError::InvalidArgument)?;
        if file.is_in_use() {
            Ok(file)
        } else {
            Err(KernelError::InvalidArgument)
        }
    }

    fn get_mut(&mut self, fd: i32) -> KResult<(&'static dyn FileOps, &mut FileDescriptor)> {
        self.get(fd)?;
        let file = &mut self.files[fd as usize];
        let ops = file.ops.ok_or(KernelError::InvalidArgument)?;
        Ok((ops, file))
    }

    /// Open `name`, returning the descriptor number. The two console names
    /// resolve to their fixed descriptors.
    pub fn open(&mut self, io: &mut IoContext<'_>, name: &[u8]) -> KResult<usize> {
        match name {
            b"stdin" => return Ok(STDIN),
            b"stdout" => return Ok(STDOUT),
            _ => {}
        }
        if name.len() > FILE_NAME_MAX {
            return Err(KernelError::NotFound);
        }
        let dentry = io.fs.lookup_by_name(name)?;
        let ops: &'static dyn FileOps = match dentry.file_type {
            FileType::Rtc => &RTC_OPS,
            FileType::Directory => &DIRECTORY_OPS,
            FileType::Regular => &REGULAR_OPS,
        };
        let fd = self
            .files
            .iter()
            .position(|f| !f.is_in_use())
            .ok_or(KernelError::ResourceExhausted)?;

        let file = &mut self.files[fd];
        *file = FileDescriptor::bound(ops, dentry.inode, FdFlags::empty());
        if let Err(e) = ops.open(io, file) {
            *file = FileDescriptor::closed();
            return Err(e);
        }
        Ok(fd)
    }

    pub fn read(&mut self, io: &mut IoContext<'_>, fd: i32, buf: &mut [u8]) -> Poll<KResult<usize>> {
        match self.get_mut(fd) {
            Ok((ops, file)) => ops.read(io, file, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    pub fn write(&mut self, io: &mut IoContext<'_>, fd: i32, buf: &[u8]) -> KResult<usize> {
        let (ops, file) = self.get_mut(fd)?;
        ops.write(io, file, buf)
    }

    /// The slot is freed even when the driver's close fails.
    pub fn close(&mut self, io: &mut IoContext<'_>, fd: i32) -> KResult<()> {
        let (ops, file) = self.get_mut(fd)?;
        if file.flags.contains(FdFlags::PERMANENT) {
            return Ok(());
        }
        let result = ops.close(io, file);
        *file = FileDescriptor::closed();
        result
    }

    /// Close everything a dying process left open. Returns how many closes
    /// failed; the slots are freed regardless.
    pub fn close_all(&mut self, io: &mut IoContext<'_>) -> usize {
        let mut failed = 0;
        for fd in 0..MAX_FILES as i32 {
            if self.get(fd).is_ok() && self.close(io, fd).is_err() {
                failed += 1;
            }
        }
        failed
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.files.iter()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

// ══════════════════════════════════════════════════════════════
//  Operation tables
// ══════════════════════════════════════════════════════════════

pub struct StdinOps;
pub struct StdoutOps;
pub struct RtcOps;
pub struct DirectoryOps;
pub struct RegularOps;

pub static STDIN_OPS: StdinOps = StdinOps;
pub static STDOUT_OPS: StdoutOps = StdoutOps;
pub static RTC_OPS: RtcOps = RtcOps;
pub static DIRECTORY_OPS: DirectoryOps = DirectoryOps;
pub static REGULAR_OPS: RegularOps = RegularOps;

impl FileOps for StdinOps {
    fn open(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor) -> KResult<()> {
        Ok(())
    }

    fn read(&self, io: &mut IoContext<'_>, _: &mut FileDescriptor, buf: &mut [u8]) -> Poll<KResult<usize>> {
        io.devices.terminal_read(io.terminal, buf).map(Ok)
    }

    fn write(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor, _: &[u8]) -> KResult<usize> {
        Err(KernelError::InvalidArgument)
    }

    fn close(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor) -> KResult<()> {
        Ok(())
    }
}

impl FileOps for StdoutOps {
    fn open(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor) -> KResult<()> {
        Ok(())
    }

    fn read(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor, _: &mut [u8]) -> Poll<KResult<usize>> {
        Poll::Ready(Err(KernelError::InvalidArgument))
    }

    fn write(&self, io: &mut IoContext<'_>, _: &mut FileDescriptor, buf: &[u8]) -> KResult<usize> {
        Ok(io.devices.terminal_write(io.terminal, io.foreground, buf))
    }

    fn close(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor) -> KResult<()> {
        Ok(())
    }
}

impl FileOps for RtcOps {
    fn open(&self, io: &mut IoContext<'_>, _: &mut FileDescriptor) -> KResult<()> {
        io.devices.rtc_open(io.terminal);
        Ok(())
    }

    fn read(&self, io: &mut IoContext<'_>, _: &mut FileDescriptor, _: &mut [u8]) -> Poll<KResult<usize>> {
        io.devices.rtc_read(io.terminal).map(|()| Ok(0))
    }

    /// Takes the new rate as a 4-byte little-endian frequency.
    fn write(&self, io: &mut IoContext<'_>, _: &mut FileDescriptor, buf: &[u8]) -> KResult<usize> {
        let bytes: [u8; 4] = buf.try_into().map_err(|_| KernelError::InvalidArgument)?;
        let hz = u32::from_le_bytes(bytes);
        if !hz.is_power_of_two() || !(RTC_MIN_HZ..=RTC_MAX_HZ).contains(&hz) {
            return Err(KernelError::InvalidArgument);
        }
        io.devices.rtc_write(io.terminal, hz);
        Ok(bytes.len())
    }

    fn close(&self, io: &mut IoContext<'_>, _: &mut FileDescriptor) -> KResult<()> {
        io.devices.rtc_close(io.terminal)
    }
}

impl FileOps for DirectoryOps {
    fn open(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor) -> KResult<()> {
        Ok(())
    }

    /// One entry name per call; 0 once the listing is exhausted.
    fn read(&self, io: &mut IoContext<'_>, file: &mut FileDescriptor, buf: &mut [u8]) -> Poll<KResult<usize>> {
        let dentry = match io.fs.lookup_by_index(file.position) {
            Ok(dentry) => dentry,
            Err(KernelError::NotFound) => return Poll::Ready(Ok(0)),
            Err(e) => return Poll::Ready(Err(e)),
        };
        let name = dentry.name();
        let len = name.len().min(buf.len());
        buf[..len].copy_from_slice(&name[..len]);
        file.position += 1;
        Poll::Ready(Ok(len))
    }

    fn write(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor, _: &[u8]) -> KResult<usize> {
        Err(KernelError::InvalidArgument)
    }

    fn close(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor) -> KResult<()> {
        Ok(())
    }
}

impl FileOps for RegularOps {
    fn open(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor) -> KResult<()> {
        Ok(())
    }

    fn read(&self, io: &mut IoContext<'_>, file: &mut FileDescriptor, buf: &mut [u8]) -> Poll<KResult<usize>> {
        let read = io.fs.read_bytes(file.inode, file.position, buf);
        if let Ok(n) = read {
            file.position += n as u32;
        }
        Poll::Ready(read)
    }

    /// The boot file system is read-only.
    fn write(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor, _: &[u8]) -> KResult<usize> {
        Err(KernelError::InvalidArgument)
    }

    fn close(&self, _: &mut IoContext<'_>, _: &mut FileDescriptor) -> KResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::BootFs;
    use crate::sim::{ImageBuilder, SimDevices};

    fn tty0() -> TerminalId {
        TerminalId::new(0).unwrap()
    }

    fn image() -> std::vec::Vec<u8> {
        let text: std::vec::Vec<u8> = (0..100u8).collect();
        ImageBuilder::new()
            .directory(".")
            .rtc("rtc")
            .file("frame0.txt", &text)
            .file("shell", b"\x7fELF")
            .build()
    }

    #[test]
    fn console_names_map_to_fixed_descriptors() {
        let image = image();
        let fs = BootFs::new(&image).unwrap();
        let mut devices = SimDevices::new();
        let mut io = IoContext { fs: &fs, devices: &mut devices, terminal: tty0(), foreground: true };
        let mut table = FdTable::new();

        assert_eq!(table.open(&mut io, b"stdin"), Ok(STDIN));
        assert_eq!(table.open(&mut io, b"stdout"), Ok(STDOUT));
        assert_eq!(table.close(&mut io, 0), Ok(()));
        assert!(table.get(0).unwrap().is_in_use());
        assert!(table.get(0).unwrap().flags.contains(FdFlags::IN_USE));
        assert_eq!(table.close(&mut io, 1), Ok(()));
        assert!(table.get(1).is_ok());
    }

    #[test]
    fn bad_descriptors_never_dispatch() {
        let image = image();
        let fs = BootFs::new(&image).unwrap();
        let mut devices = SimDevices::new();
        let mut io = IoContext { fs: &fs, devices: &mut devices, terminal: tty0(), foreground: true };
        let mut table = FdTable::new();
        let mut buf = [0u8; 4];

        for fd in [-1, 2, 7, 8, 100] {
            assert_eq!(table.read(&mut io, fd, &mut buf), Poll::Ready(Err(KernelError::InvalidArgument)));
            assert_eq!(table.write(&mut io, fd, &buf), Err(KernelError::InvalidArgument));
            assert_eq!(table.close(&mut io, fd), Err(KernelError::InvalidArgument));
        }
        // stdin is read-only, stdout write-only
        assert_eq!(table.write(&mut io, 0, b"x"), Err(KernelError::InvalidArgument));
        assert_eq!(table.read(&mut io, 1, &mut buf), Poll::Ready(Err(KernelError::InvalidArgument)));
        drop(io);
        assert!(devices.output(tty0()).is_empty());
    }

    #[test]
    fn regular_reads_accumulate_position() {
        let image = image();
        let fs = BootFs::new(&image).unwrap();
        let mut devices = SimDevices::new();
        let mut io = IoContext { fs: &fs, devices: &mut devices, terminal: tty0(), foreground: true };

        let mut split = FdTable::new();
        let fd = split.open(&mut io, b"frame0.txt").unwrap() as i32;
        assert_eq!(fd, 2);
        let mut first = [0u8; 10];
        let mut second = [0u8; 10];
        assert_eq!(split.read(&mut io, fd, &mut first), Poll::Ready(Ok(10)));
        assert_eq!(split.read(&mut io, fd, &mut second), Poll::Ready(Ok(10)));

        let mut whole_table = FdTable::new();
        let fd = whole_table.open(&mut io, b"frame0.txt").unwrap() as i32;
        let mut whole = [0u8; 20];
        assert_eq!(whole_table.read(&mut io, fd, &mut whole), Poll::Ready(Ok(20)));

        assert_eq!(&whole[..10], &first);
        assert_eq!(&whole[10..], &second);
    }

    #[test]
    fn directory_lists_one_name_per_read() {
        let image = image();
        let fs = BootFs::new(&image).unwrap();
        let mut devices = SimDevices::new();
        let mut io = IoContext { fs: &fs, devices: &mut devices, terminal: tty0(), foreground: true };
        let mut table = FdTable::new();
        let fd = table.open(&mut io, b".").unwrap() as i32;

        let mut names = std::vec::Vec::new();
        loop {
            let mut buf = [0u8; 32];
            match table.read(&mut io, fd, &mut buf) {
                Poll::Ready(Ok(0)) => break,
                Poll::Ready(Ok(n)) => names.push(buf[..n].to_vec()),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(names, std::vec![b".".to_vec(), b"rtc".to_vec(), b"frame0.txt".to_vec(), b"shell".to_vec()]);
        assert_eq!(table.write(&mut io, fd, b"x"), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn descriptors_run_out_after_six_opens() {
        let image = image();
        let fs = BootFs::new(&image).unwrap();
        let mut devices = SimDevices::new();
        let mut io = IoContext { fs: &fs, devices: &mut devices, terminal: tty0(), foreground: true };
        let mut table = FdTable::new();

        for expected in 2..MAX_FILES {
            assert_eq!(table.open(&mut io, b"frame0.txt"), Ok(expected));
        }
        assert_eq!(table.open(&mut io, b"frame0.txt"), Err(KernelError::ResourceExhausted));
        assert_eq!(table.close(&mut io, 4), Ok(()));
        assert_eq!(table.open(&mut io, b"rtc"), Ok(4));
        assert_eq!(table.open(&mut io, b"missing"), Err(KernelError::NotFound));
    }

    #[test]
    fn rtc_accepts_powers_of_two_only() {
        let image = image();
        let fs = BootFs::new(&image).unwrap();
        let mut devices = SimDevices::new();
        let mut io = IoContext { fs: &fs, devices: &mut devices, terminal: tty0(), foreground: true };
        let mut table = FdTable::new();
        let fd = table.open(&mut io, b"rtc").unwrap() as i32;

        assert_eq!(table.write(&mut io, fd, &32u32.to_le_bytes()), Ok(4));
        assert_eq!(table.write(&mut io, fd, &48u32.to_le_bytes()), Err(KernelError::InvalidArgument));
        assert_eq!(table.write(&mut io, fd, &2048u32.to_le_bytes()), Err(KernelError::InvalidArgument));
        assert_eq!(table.write(&mut io, fd, &[2, 0]), Err(KernelError::InvalidArgument));

        let mut buf = [0u8; 4];
        assert_eq!(table.read(&mut io, fd, &mut buf), Poll::Pending);
        drop(io);
        devices.rtc_tick(tty0());
        let mut io = IoContext { fs: &fs, devices: &mut devices, terminal: tty0(), foreground: true };
        assert_eq!(table.read(&mut io, fd, &mut buf), Poll::Ready(Ok(0)));
        assert_eq!(table.close(&mut io, fd), Ok(()));
        drop(io);
        assert_eq!(devices.rtc_rate(tty0()), Some(32));
        assert!(!devices.rtc_is_open(tty0()));
    }

    #[test]
    fn stdout_writes_reach_the_terminal() {
        let image = image();
        let fs = BootFs::new(&image).unwrap();
        let mut devices = SimDevices::new();
        let mut io = IoContext { fs: &fs, devices: &mut devices, terminal: tty0(), foreground: true };
        let mut table = FdTable::new();
        assert_eq!(table.write(&mut io, 1, b"391OS> "), Ok(7));
        drop(io);
        assert_eq!(devices.output(tty0()), b"391OS> ");
    }
}
