//! Software models of the hardware collaborators, for driving the kernel in
//! unit tests: a CPU that walks the installed page tables over sparse
//! physical memory, scripted devices, and a boot image builder.

use std::boxed::Box;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::string::String;
use std::vec;
use std::vec::Vec;

use core::task::Poll;

use crate::config::{KernelConfig, LARGE_PAGE_SIZE, NUM_TERMINALS, USER_WINDOW_BASE};
use crate::cpu::{Cpu, KernelStack};
use crate::drivers::{ConsoleState, Devices, TerminalId};
use crate::error::{KResult, KernelError};
use crate::fs::bootfs::{BLOCK_SIZE, DENTRY_SIZE};
use crate::fs::{BootFs, FileSystem, FileType};
use crate::kernel::Kernel;
use crate::memory::{self, AddressSpace};
use crate::scheduler::context::{SavedContext, Transfer};
use crate::sync::Idle;
use crate::syscalls::{SyscallOutcome, SYS_OPEN};

pub type SimKernel = Kernel<SimCpu, BootFs<'static>, SimDevices>;

pub const SHELL_ENTRY: u32 = 0x0804_8094;
pub const LS_ENTRY: u32 = 0x0804_80a0;
pub const COUNTER_ENTRY: u32 = 0x0804_80c4;

/// User memory tests scribble on, well past any loaded image.
pub const SCRATCH: u32 = USER_WINDOW_BASE + 0x0020_0000;
const NAME_SCRATCH: u32 = USER_WINDOW_BASE + 0x0030_0000;

pub const FRAME0: &[u8] = b"/\\/\\/\\/\\/\\/\\/\\/\\/\\/\\\n   o\n  o    o\n     o\n";

/// An executable: the magic, the entry point at byte 24, filler after.
pub fn program_image(entry: u32, size: usize) -> Vec<u8> {
    let mut image: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    image[..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
    image[24..28].copy_from_slice(&entry.to_le_bytes());
    image
}

/// The image most tests boot from.
pub fn standard_image() -> Vec<u8> {
    ImageBuilder::new()
        .directory(".")
        .file("shell", &program_image(SHELL_ENTRY, 1024))
        .file("ls", &program_image(LS_ENTRY, 512))
        .file("counter", &program_image(COUNTER_ENTRY, 768))
        .file("frame0.txt", FRAME0)
        .file("notes", b"nothing to run here\n")
        .rtc("rtc")
        .build()
}

/// A kernel over `image`, not yet booted. The image is leaked so the file
/// system can borrow it for the rest of the test.
pub fn kernel(image: Vec<u8>) -> Box<SimKernel> {
    let image: &'static [u8] = Box::leak(image.into_boxed_slice());
    let fs = BootFs::new(image).expect("test image is well formed");
    Box::new(Kernel::new(SimCpu::new(), fs, SimDevices::new(), KernelConfig::default()))
}

/// A kernel over the standard image with terminal 0's shell started.
pub fn booted() -> Box<SimKernel> {
    let mut kernel = kernel(standard_image());
    kernel.boot().expect("boot");
    kernel
}

/// Play the glue's part of a transfer: store the outgoing stack where the
/// transfer asks for it, then return to a target that runs with interrupts on.
pub fn commit(kernel: &mut SimKernel, transfer: &Transfer, outgoing: SavedContext) {
    if let Some(slot) = transfer.save {
        *kernel
            .context_slot_mut(slot)
            .expect("transfer saves into a live process") = outgoing;
    }
    kernel.cpu_mut().restore_interrupts(true);
}

/// Open `name` on behalf of the resident process through the trap interface.
pub fn open(kernel: &mut SimKernel, name: &str) -> i32 {
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);
    kernel.cpu_mut().write_virtual(NAME_SCRATCH, &bytes);
    match kernel.syscall(SYS_OPEN, NAME_SCRATCH, 0, 0) {
        SyscallOutcome::Return(fd) => fd,
        other => panic!("open returned {:?}", other),
    }
}

/// Point data-block slot `slot` of `name`'s inode past the data area.
pub fn corrupt_block_index(image: &mut [u8], name: &str, slot: usize) {
    let fs = BootFs::new(image).expect("test image is well formed");
    let inode = fs.lookup_by_name(name.as_bytes()).expect("file in image").inode as usize;
    let data_blocks = read_u32(image, 8);
    let at = (1 + inode) * BLOCK_SIZE + 4 + slot * 4;
    image[at..at + 4].copy_from_slice(&(data_blocks + 7).to_le_bytes());
}

fn read_u32(image: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([image[at], image[at + 1], image[at + 2], image[at + 3]])
}

// ══════════════════════════════════════════════════════════════
//  Boot image
// ══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct ImageBuilder {
    entries: Vec<(String, FileType, Vec<u8>)>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.entries.push((name.into(), FileType::Directory, Vec::new()));
        self
    }

    pub fn rtc(mut self, name: &str) -> Self {
        self.entries.push((name.into(), FileType::Rtc, Vec::new()));
        self
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push((name.into(), FileType::Regular, data.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let files: Vec<&Vec<u8>> = self
            .entries
            .iter()
            .filter(|(_, kind, _)| *kind == FileType::Regular)
            .map(|(_, _, data)| data)
            .collect();
        let inodes = files.len();
        let data_blocks: usize = files.iter().map(|d| d.len().div_ceil(BLOCK_SIZE)).sum();
        let mut image = vec![0u8; (1 + inodes + data_blocks) * BLOCK_SIZE];

        image[0..4].copy_from_slice(&(self.entries.len() as u32).to_le_bytes());
        image[4..8].copy_from_slice(&(inodes as u32).to_le_bytes());
        image[8..12].copy_from_slice(&(data_blocks as u32).to_le_bytes());

        let mut inode = 0usize;
        let mut next_block = 0usize;
        for (i, (name, kind, data)) in self.entries.iter().enumerate() {
            let base = 64 + i * DENTRY_SIZE;
            let name = name.as_bytes();
            image[base..base + name.len()].copy_from_slice(name);
            image[base + 32..base + 36].copy_from_slice(&kind.raw().to_le_bytes());
            if *kind != FileType::Regular {
                continue;
            }
            image[base + 36..base + 40].copy_from_slice(&(inode as u32).to_le_bytes());

            let block = (1 + inode) * BLOCK_SIZE;
            image[block..block + 4].copy_from_slice(&(data.len() as u32).to_le_bytes());
            for (n, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
                let at = block + 4 + n * 4;
                image[at..at + 4].copy_from_slice(&(next_block as u32).to_le_bytes());
                let start = (1 + inodes + next_block) * BLOCK_SIZE;
                image[start..start + chunk.len()].copy_from_slice(chunk);
                next_block += 1;
            }
            inode += 1;
        }
        image
    }
}

// ══════════════════════════════════════════════════════════════
//  CPU
// ══════════════════════════════════════════════════════════════

/// One `load_page_directory` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remap {
    pub window: Option<u32>,
    pub interrupts_enabled: bool,
}

/// Translation happens through a copy of the directory taken at load time,
/// so edits the kernel forgets to flush stay invisible, as on hardware.
pub struct SimCpu {
    installed: Option<Box<AddressSpace>>,
    /// 4 MiB regions keyed by physical address >> 22.
    memory: BTreeMap<u32, Vec<u8>>,
    stack: KernelStack,
    interrupts: bool,
    remaps: Vec<Remap>,
    stack_changes: Vec<bool>,
}

impl SimCpu {
    pub fn new() -> Self {
        let mut cpu = SimCpu {
            installed: None,
            memory: BTreeMap::new(),
            stack: KernelStack::default(),
            interrupts: true,
            remaps: Vec::new(),
            stack_changes: Vec::new(),
        };
        cpu.region_mut(0);
        cpu
    }

    /// Physical base of the installed process window.
    pub fn window(&self) -> Option<u32> {
        self.resolve(USER_WINDOW_BASE)
    }

    pub fn resolve(&self, addr: u32) -> Option<u32> {
        self.installed.as_ref()?.translate(addr)
    }

    pub fn read_virtual(&self, addr: u32, len: usize) -> Vec<u8> {
        let phys = self.resolve(addr).expect("address is mapped");
        self.read_physical(phys, len)
    }

    pub fn write_virtual(&mut self, addr: u32, bytes: &[u8]) {
        let phys = self.resolve(addr).expect("address is mapped");
        self.write_physical(phys, bytes);
    }

    pub fn read_physical(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len as u32)
            .map(|i| {
                let at = addr + i;
                self.memory
                    .get(&(at / LARGE_PAGE_SIZE))
                    .map_or(0, |region| region[(at % LARGE_PAGE_SIZE) as usize])
            })
            .collect()
    }

    pub fn write_physical(&mut self, addr: u32, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            let at = addr + i as u32;
            self.region_mut(at / LARGE_PAGE_SIZE)[(at % LARGE_PAGE_SIZE) as usize] = byte;
        }
    }

    pub fn remaps(&self) -> &[Remap] {
        &self.remaps
    }

    /// Interrupt state at every kernel stack update.
    pub fn stack_changes(&self) -> &[bool] {
        &self.stack_changes
    }

    pub fn clear_log(&mut self) {
        self.remaps.clear();
        self.stack_changes.clear();
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts
    }

    fn region_mut(&mut self, region: u32) -> &mut Vec<u8> {
        self.memory
            .entry(region)
            .or_insert_with(|| vec![0u8; LARGE_PAGE_SIZE as usize])
    }

    /// Region and offset backing a user range, checked the way the MMU
    /// would check a ring 3 access.
    fn user_location(&self, addr: u32, len: usize) -> KResult<(u32, usize)> {
        memory::check_user_range(addr, len)?;
        let phys = self
            .installed
            .as_ref()
            .and_then(|space| space.translate_user(addr))
            .ok_or(KernelError::Fault)?;
        Ok((phys / LARGE_PAGE_SIZE, (phys % LARGE_PAGE_SIZE) as usize))
    }
}

impl Default for SimCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for SimCpu {
    fn load_page_directory(&mut self, space: &AddressSpace) {
        let snapshot = Box::new(space.clone());
        let window = snapshot.translate(USER_WINDOW_BASE);
        if let Some(base) = window {
            self.region_mut(base / LARGE_PAGE_SIZE);
        }
        self.installed = Some(snapshot);
        self.remaps.push(Remap {
            window,
            interrupts_enabled: self.interrupts,
        });
    }

    fn kernel_stack(&self) -> KernelStack {
        self.stack
    }

    fn set_kernel_stack(&mut self, stack: KernelStack) {
        self.stack_changes.push(self.interrupts);
        self.stack = stack;
    }

    fn disable_interrupts(&mut self) -> bool {
        core::mem::replace(&mut self.interrupts, false)
    }

    fn restore_interrupts(&mut self, enabled: bool) {
        self.interrupts = enabled;
    }

    fn user_slice(&self, addr: u32, len: usize) -> KResult<&[u8]> {
        let (region, offset) = self.user_location(addr, len)?;
        let region = self.memory.get(&region).ok_or(KernelError::Fault)?;
        Ok(&region[offset..offset + len])
    }

    fn user_slice_mut(&mut self, addr: u32, len: usize) -> KResult<&mut [u8]> {
        let (region, offset) = self.user_location(addr, len)?;
        Ok(&mut self.region_mut(region)[offset..offset + len])
    }

    fn copy_physical(&mut self, dst: u32, src: u32, len: usize) {
        let bytes = self.read_physical(src, len);
        self.write_physical(dst, &bytes);
    }
}

// ══════════════════════════════════════════════════════════════
//  Devices
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
struct VirtualRtc {
    open: bool,
    rate: Option<u32>,
    ticked: bool,
    close_fails: bool,
}

#[derive(Default)]
struct ScriptState {
    now: u32,
    lines: Vec<(u32, TerminalId, Vec<u8>)>,
}

/// Keyboard input that shows up after a number of idle periods.
#[derive(Clone, Default)]
pub struct Script {
    state: Rc<RefCell<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Type `line` on `terminal` once `ticks` idle periods have passed.
    pub fn after(&self, ticks: u32, terminal: TerminalId, line: &[u8]) {
        self.state.borrow_mut().lines.push((ticks, terminal, line.to_vec()));
    }

    pub fn now(&self) -> u32 {
        self.state.borrow().now
    }

    pub fn clock(&self) -> ScriptedClock {
        ScriptedClock {
            script: self.clone(),
        }
    }

    fn due(&self) -> Vec<(TerminalId, Vec<u8>)> {
        let mut state = self.state.borrow_mut();
        let now = state.now;
        let (due, later) = state
            .lines
            .drain(..)
            .partition::<Vec<_>, _>(|(at, _, _)| *at <= now);
        state.lines = later;
        due.into_iter().map(|(_, tty, line)| (tty, line)).collect()
    }
}

/// Advances its script by one tick per idle.
pub struct ScriptedClock {
    script: Script,
}

impl Idle for ScriptedClock {
    fn idle(&mut self) {
        self.script.state.borrow_mut().now += 1;
    }
}

pub struct SimDevices {
    input: [VecDeque<Vec<u8>>; NUM_TERMINALS],
    output: [Vec<u8>; NUM_TERMINALS],
    rtc: [VirtualRtc; NUM_TERMINALS],
    console: ConsoleState,
    discarded: Vec<TerminalId>,
    script: Option<Script>,
}

impl SimDevices {
    pub fn new() -> Self {
        SimDevices {
            input: Default::default(),
            output: Default::default(),
            rtc: Default::default(),
            console: ConsoleState::new(),
            discarded: Vec::new(),
            script: None,
        }
    }

    pub fn attach(&mut self, script: &Script) {
        self.script = Some(script.clone());
    }

    /// A completed line ready for the next read on `terminal`.
    pub fn push_line(&mut self, terminal: TerminalId, line: &[u8]) {
        self.input[terminal.index()].push_back(line.to_vec());
    }

    pub fn output(&self, terminal: TerminalId) -> &[u8] {
        &self.output[terminal.index()]
    }

    pub fn rtc_tick(&mut self, terminal: TerminalId) {
        self.rtc[terminal.index()].ticked = true;
    }

    pub fn rtc_rate(&self, terminal: TerminalId) -> Option<u32> {
        self.rtc[terminal.index()].rate
    }

    pub fn rtc_is_open(&self, terminal: TerminalId) -> bool {
        self.rtc[terminal.index()].open
    }

    /// Make the next closes of `terminal`'s clock fail.
    pub fn fail_rtc_close(&mut self, terminal: TerminalId) {
        self.rtc[terminal.index()].close_fails = true;
    }

    /// Lines still waiting to be read on `terminal`.
    pub fn pending_lines(&self, terminal: TerminalId) -> usize {
        self.input[terminal.index()].len()
    }

    pub fn discarded(&self) -> &[TerminalId] {
        &self.discarded
    }

    pub fn console(&self) -> &ConsoleState {
        &self.console
    }

    /// Pretend the user has typed `line` without pressing enter.
    pub fn set_console_line(&mut self, line: &[u8]) {
        self.console.line[..line.len()].copy_from_slice(line);
        self.console.line_len = line.len();
        self.console.cursor_x = line.len() as u16;
    }
}

impl Default for SimDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl Devices for SimDevices {
    fn terminal_read(&mut self, terminal: TerminalId, buf: &mut [u8]) -> Poll<usize> {
        if let Some(script) = &self.script {
            for (tty, line) in script.due() {
                self.input[tty.index()].push_back(line);
            }
        }
        match self.input[terminal.index()].pop_front() {
            Some(line) => {
                let len = line.len().min(buf.len());
                buf[..len].copy_from_slice(&line[..len]);
                Poll::Ready(len)
            }
            None => Poll::Pending,
        }
    }

    fn terminal_write(&mut self, terminal: TerminalId, _foreground: bool, buf: &[u8]) -> usize {
        self.output[terminal.index()].extend_from_slice(buf);
        buf.len()
    }

    fn rtc_open(&mut self, terminal: TerminalId) {
        self.rtc[terminal.index()] = VirtualRtc {
            open: true,
            rate: Some(2),
            ticked: false,
            close_fails: false,
        };
    }

    fn rtc_read(&mut self, terminal: TerminalId) -> Poll<()> {
        let rtc = &mut self.rtc[terminal.index()];
        if core::mem::take(&mut rtc.ticked) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    fn rtc_write(&mut self, terminal: TerminalId, hz: u32) {
        self.rtc[terminal.index()].rate = Some(hz);
    }

    fn rtc_close(&mut self, terminal: TerminalId) -> KResult<()> {
        let rtc = &mut self.rtc[terminal.index()];
        if rtc.close_fails {
            return Err(KernelError::Device);
        }
        rtc.open = false;
        Ok(())
    }

    fn save_console(&mut self) -> ConsoleState {
        self.console
    }

    fn restore_console(&mut self, state: &ConsoleState) {
        self.console = *state;
    }

    fn discard_input(&mut self, terminal: TerminalId) {
        self.input[terminal.index()].clear();
        self.discarded.push(terminal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_image_parses() {
        let image = standard_image();
        let fs = BootFs::new(&image).unwrap();
        assert_eq!(fs.dentry_count(), 7);
        let frame = fs.lookup_by_name(b"frame0.txt").unwrap();
        assert_eq!(fs.file_size(frame.inode), Ok(FRAME0.len() as u32));
    }

    #[test]
    fn unflushed_edits_are_invisible() {
        let mut space = Box::new(AddressSpace::new());
        space.init();
        let mut cpu = SimCpu::new();
        cpu.load_page_directory(&space);
        space.remap(0x0080_0000);
        assert_eq!(cpu.window(), None);
        cpu.load_page_directory(&space);
        assert_eq!(cpu.window(), Some(0x0080_0000));
    }

    #[test]
    fn kernel_pages_are_not_user_accessible() {
        let mut space = Box::new(AddressSpace::new());
        space.init();
        let mut cpu = SimCpu::new();
        cpu.load_page_directory(&space);
        assert_eq!(cpu.user_slice(USER_WINDOW_BASE, 4).err(), Some(KernelError::Fault));
        assert_eq!(cpu.user_slice(0xB8000, 4).err(), Some(KernelError::InvalidArgument));
    }
}
