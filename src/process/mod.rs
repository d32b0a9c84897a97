pub mod exit;
pub mod pcb;
pub mod pid;

pub use exit::ExitStatus;
pub use pcb::Pcb;
pub use pid::{Pid, PidRegistry};

use crate::config::MAX_PROCESSES;
use crate::drivers::Terminal;
use crate::error::KResult;
use crate::scheduler::context::{ContextSlot, SavedContext};

/// Fixed-capacity process store: the pid bitmap plus one control-block slot
/// per pid, indexed by pid.
#[derive(Debug, Clone)]
pub struct ProcessTable {
    pids: PidRegistry,
    pcbs: [Option<Pcb>; MAX_PROCESSES],
}

impl ProcessTable {
    pub const fn new() -> Self {
        ProcessTable {
            pids: PidRegistry::new(),
            pcbs: [const { None }; MAX_PROCESSES],
        }
    }

    pub fn allocate_pid(&mut self) -> KResult<Pid> {
        self.pids.allocate()
    }

    /// Give the pid back. Its control block goes with it.
    pub fn release(&mut self, pid: Pid) {
        self.pids.release(pid);
        self.pcbs[pid.index()] = None;
    }

    /// Fill in the control block of a freshly allocated pid. Whatever runs on
    /// `terminal` right now becomes the parent; nothing running means this is
    /// the terminal's root shell.
    pub fn init_pcb(&mut self, pid: Pid, terminal: &Terminal, args: &[u8]) -> &mut Pcb {
        let pcb = Pcb::new(pid, terminal.id(), terminal.running, args);
        self.pcbs[pid.index()].insert(pcb)
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.pcbs[pid.index()].as_ref()
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.pcbs[pid.index()].as_mut()
    }

    pub fn is_live(&self, pid: Pid) -> bool {
        self.pids.is_allocated(pid)
    }

    pub fn live_count(&self) -> usize {
        self.pids.count()
    }

    /// The saved-context field a transfer writes the outgoing stack into.
    pub fn context_slot_mut(&mut self, slot: ContextSlot) -> Option<&mut SavedContext> {
        match slot {
            ContextSlot::Exec(pid) => self.get_mut(pid).map(|pcb| &mut pcb.exec_context),
            ContextSlot::Preempt(pid) => self.get_mut(pid).map(|pcb| &mut pcb.preempt_context),
        }
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
