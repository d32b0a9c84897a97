use crate::config::{KernelConfig, VIDEO_MEMORY, VIDMAP_ADDR};
use crate::cpu::Cpu;
use crate::drivers::{Devices, TerminalId, Terminals};
use crate::error::KResult;
use crate::fs::FileSystem;
use crate::loader::Command;
use crate::memory::AddressSpace;
use crate::process::{Pid, ProcessTable};
use crate::scheduler::context::{ContextSlot, Handoff, SavedContext, Transfer};

/// The whole kernel state, created once at boot and reached through one
/// handle. Its fields are split by concern so an operation can hold the file
/// system, the devices and the CPU at the same time.
///
/// Must not move after [`Kernel::boot`]: the page directory records the
/// addresses of its own tables. [`Kernel::new`] is `const` so the bare-metal
/// kernel can sit in a `static` instead of passing through the boot stack.
pub struct Kernel<C: Cpu, F: FileSystem, D: Devices> {
    pub(crate) cpu: C,
    pub(crate) fs: F,
    pub(crate) devices: D,
    pub(crate) config: KernelConfig,
    pub(crate) memory: AddressSpace,
    pub(crate) processes: ProcessTable,
    pub(crate) terminals: Terminals,
}

impl<C: Cpu, F: FileSystem, D: Devices> Kernel<C, F, D> {
    pub const fn new(cpu: C, fs: F, devices: D, config: KernelConfig) -> Self {
        Kernel {
            cpu,
            fs,
            devices,
            config,
            memory: AddressSpace::new(),
            processes: ProcessTable::new(),
            terminals: Terminals::new(),
        }
    }

    /// Turn on paging and start the root shell of terminal 0. The other
    /// terminals get theirs the first time they are brought to the front.
    pub fn boot(&mut self) -> KResult<Transfer> {
        self.memory.init();
        self.cpu.load_page_directory(&self.memory);
        crate::log_info!("paging enabled, directory at {:#x}", self.memory.directory_base());

        let shell = Command::parse(self.config.shell.as_bytes())?;
        let first = self.terminals.running();
        let transfer = self.launch(first, &shell, None)?;
        crate::log_info!("root shell started on {}", first);
        Ok(transfer)
    }

    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    pub fn devices(&self) -> &D {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut D {
        &mut self.devices
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn memory(&self) -> &AddressSpace {
        &self.memory
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    /// Process owning the CPU, if the resident terminal has one.
    pub fn current_pid(&self) -> Option<Pid> {
        self.terminals[self.terminals.running()].running
    }

    /// Where the glue stores the outgoing stack of a transfer.
    pub fn context_slot_mut(&mut self, slot: ContextSlot) -> Option<&mut SavedContext> {
        self.processes.context_slot_mut(slot)
    }

    /// Map `pid`'s memory slot into the process window and flush.
    pub(crate) fn install_window(&mut self, pid: Pid) {
        self.memory.remap(pid.physical_base());
        self.cpu.load_page_directory(&self.memory);
    }

    /// Point the vidmap page at the live screen when `terminal` is visible,
    /// at its backup page otherwise.
    pub(crate) fn point_video_alias(&mut self, terminal: TerminalId) {
        let record = &self.terminals[terminal];
        let page = if record.is_foreground() {
            VIDEO_MEMORY
        } else {
            record.backup_page()
        };
        self.memory.remap_video(VIDMAP_ADDR, page);
        self.cpu.load_page_directory(&self.memory);
    }

    /// Run `f` with interrupts masked.
    pub(crate) fn critical<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let enabled = self.cpu.disable_interrupts();
        let result = f(self);
        self.cpu.restore_interrupts(enabled);
        result
    }

    /// Run an operation that may move the CPU to another stack. Interrupts
    /// are masked throughout and stay masked when it yields a transfer: the
    /// CPU is still on the outgoing stack until the glue performs it, and
    /// the target's `iretd` or trap return brings back its own flag.
    pub(crate) fn handoff<R: Handoff>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let enabled = self.cpu.disable_interrupts();
        let result = f(self);
        if !result.hands_off() {
            self.cpu.restore_interrupts(enabled);
        }
        result
    }
}
