//! Process termination: `halt`, keyboard cancellation, and fault kills.

use crate::config::{KernelConfig, FAULT_STATUS};
use crate::cpu::Cpu;
use crate::drivers::Devices;
use crate::error::{KResult, KernelError};
use crate::fs::{FileSystem, IoContext};
use crate::kernel::Kernel;
use crate::loader::Command;
use crate::process::Pid;
use crate::scheduler::context::{ContextSlot, Target, Transfer};

/// Why a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The program called halt with this byte.
    Exited(u8),
    /// Killed from the keyboard.
    Cancelled,
    /// Killed by an unhandled exception.
    Fault,
}

impl ExitStatus {
    /// The value the parent's `execute` returns.
    pub fn code(self, config: &KernelConfig) -> i32 {
        match self {
            ExitStatus::Exited(status) => status as i32,
            ExitStatus::Cancelled => config.cancel_status as i32,
            ExitStatus::Fault => FAULT_STATUS,
        }
    }
}

impl<C: Cpu, F: FileSystem, D: Devices> Kernel<C, F, D> {
    /// End the CPU-resident process. Control goes back into the parent's
    /// suspended `execute`, or to a fresh root shell when the process had no
    /// parent.
    pub fn halt(&mut self, status: ExitStatus) -> KResult<Transfer> {
        let pid = self.current_pid().ok_or(KernelError::InvalidArgument)?;
        Ok(self.handoff(|kernel| kernel.terminate(pid, status, None)))
    }

    /// Kill the foreground terminal's process (Ctrl+C). The target is read
    /// under the kernel lock, so it is the process bound to the visible
    /// terminal at the moment of the request. A different CPU-resident
    /// process is preempted first.
    pub fn cancel(&mut self) -> Option<Transfer> {
        let foreground = self.terminals.foreground();
        let pid = self.terminals[foreground].running?;

        let transfer = self.handoff(|kernel| {
            let resident = kernel.terminals.running();
            let save = if resident == foreground {
                None
            } else {
                let outgoing = kernel.terminals[resident].running;
                kernel.terminals[resident].kernel_stack = kernel.cpu.kernel_stack();
                kernel.terminals.set_running(foreground);
                kernel.point_video_alias(foreground);
                outgoing.map(ContextSlot::Preempt)
            };
            kernel.terminate(pid, ExitStatus::Cancelled, save)
        });
        crate::log_info!("cancel: pid {} on {}", pid, foreground);
        Some(transfer)
    }

    /// Tear down `pid`, which must be CPU-resident, and pick where control
    /// continues. Input typed ahead for the dying program is dropped with it.
    pub(crate) fn terminate(&mut self, pid: Pid, status: ExitStatus, save: Option<ContextSlot>) -> Transfer {
        self.critical(|kernel| {
            let (terminal, parent) = match kernel.processes.get_mut(pid) {
                Some(pcb) => {
                    let mut io = IoContext {
                        fs: &kernel.fs,
                        devices: &mut kernel.devices,
                        terminal: pcb.terminal,
                        foreground: kernel.terminals[pcb.terminal].is_foreground(),
                    };
                    let failed = pcb.fds.close_all(&mut io);
                    if failed > 0 {
                        crate::log_warn!("halt: pid {}: {} descriptor(s) failed to close", pid, failed);
                    }
                    io.devices.discard_input(pcb.terminal);
                    (pcb.terminal, pcb.parent)
                }
                None => {
                    crate::log_error!("halt: pid {} has no control block", pid);
                    panic!("terminating a dead process");
                }
            };
            kernel.processes.release(pid);
            let code = status.code(&kernel.config);

            let Some(parent) = parent else {
                crate::log_info!("halt: root shell {} on {} exited ({}), respawning", pid, terminal, code);
                kernel.terminals[terminal].running = None;
                let shell = Command::parse(kernel.config.shell.as_bytes());
                return match shell.and_then(|shell| kernel.launch(terminal, &shell, save)) {
                    Ok(transfer) => transfer,
                    Err(e) => {
                        crate::log_error!("halt: cannot respawn the root shell on {}: {}", terminal, e);
                        panic!("root shell respawn failed");
                    }
                };
            };

            kernel.terminals[terminal].running = Some(parent);
            kernel.install_window(parent);
            let (stack, context) = match kernel.processes.get(parent) {
                Some(pcb) => (pcb.kernel_stack, pcb.exec_context),
                None => {
                    crate::log_error!("halt: parent {} of pid {} is gone", parent, pid);
                    panic!("orphaned process");
                }
            };
            kernel.cpu.set_kernel_stack(stack);
            crate::log_info!("halt: pid {} -> parent {} with status {}", pid, parent, code);
            Transfer {
                save,
                target: Target::Kernel {
                    context,
                    value: Some(code),
                },
            }
        })
    }
}
