use super::Pid;
use crate::config::ARG_BUFFER_SIZE;
use crate::cpu::KernelStack;
use crate::drivers::TerminalId;
use crate::fs::FdTable;
use crate::scheduler::context::SavedContext;

/// Process control block.
#[derive(Debug, Clone)]
pub struct Pcb {
    pub pid: Pid,
    pub fds: FdTable,
    /// Where the process sits inside `execute`, waiting for its child's halt.
    pub exec_context: SavedContext,
    /// Where the process was when the timer or a terminal switch took the CPU.
    pub preempt_context: SavedContext,
    /// `None` for a terminal's root shell.
    pub parent: Option<Pid>,
    pub terminal: TerminalId,
    pub kernel_stack: KernelStack,
    args: [u8; ARG_BUFFER_SIZE],
    args_len: usize,
}

impl Pcb {
    pub fn new(pid: Pid, terminal: TerminalId, parent: Option<Pid>, args: &[u8]) -> Self {
        let mut pcb = Pcb {
            pid,
            fds: FdTable::new(),
            exec_context: SavedContext::default(),
            preempt_context: SavedContext::default(),
            parent,
            terminal,
            kernel_stack: pid.kernel_stack(),
            args: [0; ARG_BUFFER_SIZE],
            args_len: 0,
        };
        pcb.set_args(args);
        pcb
    }

    /// Keeps at most `ARG_BUFFER_SIZE - 1` bytes so the copy handed to
    /// getargs always has room for its terminator.
    fn set_args(&mut self, args: &[u8]) {
        let len = args.len().min(ARG_BUFFER_SIZE - 1);
        self.args[..len].copy_from_slice(&args[..len]);
        self.args[len..].fill(0);
        self.args_len = len;
    }

    pub fn args(&self) -> &[u8] {
        &self.args[..self.args_len]
    }
}
