//! Round-robin terminal scheduling and foreground switching.

pub mod context;

use crate::config::{PAGE_SIZE, VIDEO_MEMORY};
use crate::cpu::Cpu;
use crate::drivers::{Devices, TerminalId};
use crate::error::KResult;
use crate::fs::FileSystem;
use crate::kernel::Kernel;
use crate::loader::Command;
use context::{ContextSlot, Target, Transfer};

impl<C: Cpu, F: FileSystem, D: Devices> Kernel<C, F, D> {
    /// Timer tick: hand the CPU to the next terminal that has a process.
    /// Returns `None` when no other terminal is runnable.
    pub fn tick(&mut self) -> Option<Transfer> {
        let current = self.terminals.running();
        let next = self.terminals.next_runnable()?;
        let incoming = self.terminals[next].running?;

        let transfer = self.handoff(|kernel| {
            kernel.point_video_alias(next);

            let outgoing = kernel.terminals[current].running;
            kernel.terminals[current].kernel_stack = kernel.cpu.kernel_stack();

            kernel.install_window(incoming);
            kernel.cpu.set_kernel_stack(kernel.terminals[next].kernel_stack);
            kernel.terminals.set_running(next);

            let context = match kernel.processes.get(incoming) {
                Some(pcb) => pcb.preempt_context,
                None => {
                    crate::log_error!("sched: {} is bound to dead pid {}", next, incoming);
                    panic!("scheduled a dead process");
                }
            };
            Transfer {
                save: outgoing.map(ContextSlot::Preempt),
                target: Target::Kernel {
                    context,
                    value: None,
                },
            }
        });
        crate::log_debug!("sched: {} -> {} (pid {})", current, next, incoming);
        Some(transfer)
    }

    /// Bring `target` to the front (Alt+F1..F3). The screen and the console
    /// state trade places with the backups. A terminal shown for the first
    /// time gets its root shell immediately, taking the CPU from whatever
    /// was running.
    pub fn switch_foreground(&mut self, target: TerminalId) -> KResult<Option<Transfer>> {
        let shown = self.terminals.foreground();
        if shown == target {
            return Ok(None);
        }

        self.handoff(|kernel| {
            kernel.terminals[shown].console = kernel.devices.save_console();
            let (hidden_page, shown_page) = (
                kernel.terminals[shown].backup_page(),
                kernel.terminals[target].backup_page(),
            );
            kernel.cpu.copy_physical(hidden_page, VIDEO_MEMORY, PAGE_SIZE as usize);
            kernel.cpu.copy_physical(VIDEO_MEMORY, shown_page, PAGE_SIZE as usize);
            kernel.devices.restore_console(&kernel.terminals[target].console);
            kernel.terminals.set_foreground(target);
            crate::log_info!("tty: {} -> {}", shown, target);

            if kernel.terminals[target].running.is_some() {
                kernel.point_video_alias(kernel.terminals.running());
                return Ok(None);
            }
            kernel.start_terminal(target).map(Some)
        })
    }

    /// Launch the root shell of a terminal that has never run anything and
    /// make it CPU-resident.
    fn start_terminal(&mut self, target: TerminalId) -> KResult<Transfer> {
        let resident = self.terminals.running();
        let outgoing = self.current_pid();
        let stack = self.cpu.kernel_stack();
        let shell = Command::parse(self.config.shell.as_bytes())?;

        match self.launch(target, &shell, outgoing.map(ContextSlot::Preempt)) {
            Ok(transfer) => {
                self.terminals[resident].kernel_stack = stack;
                self.terminals.set_running(target);
                self.point_video_alias(target);
                Ok(transfer)
            }
            Err(e) => {
                crate::log_warn!("tty: cannot start a shell on {}: {}", target, e);
                self.point_video_alias(resident);
                Err(e)
            }
        }
    }
}
