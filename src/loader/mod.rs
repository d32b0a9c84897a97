//! Program loading: `execute` and the launch path shared with the root-shell
//! respawn and lazy terminal start-up.

pub mod command;
pub mod elf;

pub use command::Command;

use crate::config::PROGRAM_LOAD_ADDR;
use crate::cpu::Cpu;
use crate::drivers::{Devices, TerminalId};
use crate::error::{KResult, KernelError};
use crate::fs::{FileSystem, FileType};
use crate::kernel::Kernel;
use crate::process::Pid;
use crate::scheduler::context::{ContextSlot, Target, TrapFrame, Transfer};
use elf::ExecImage;

impl<C: Cpu, F: FileSystem, D: Devices> Kernel<C, F, D> {
    /// Start `line` as a child of the CPU-resident process. On success the
    /// caller is parked in its exec slot and only resumes when the child
    /// halts, with the child's status as the result.
    pub fn execute(&mut self, line: &[u8]) -> KResult<Transfer> {
        let command = Command::parse(line)?;
        self.execute_command(&command)
    }

    pub(crate) fn execute_command(&mut self, command: &Command) -> KResult<Transfer> {
        let terminal = self.terminals.running();
        let save = self.terminals[terminal].running.map(ContextSlot::Exec);
        self.handoff(|kernel| kernel.launch(terminal, command, save))
    }

    /// Load `command` as the new running process of `terminal`. Everything
    /// that can reject the program is checked before a pid is taken, so a
    /// bad file never costs a process slot.
    pub(crate) fn launch(
        &mut self,
        terminal: TerminalId,
        command: &Command,
        save: Option<ContextSlot>,
    ) -> KResult<Transfer> {
        let dentry = self.fs.lookup_by_name(command.name())?;
        if dentry.file_type != FileType::Regular {
            return Err(KernelError::NotExecutable);
        }
        let exec = elf::inspect(&self.fs, dentry.inode)?;
        let pid = self.processes.allocate_pid()?;

        self.critical(|kernel| kernel.load(pid, terminal, command, &exec))?;
        crate::log_info!(
            "execute: pid {} on {} ({} bytes, entry {:#x})",
            pid,
            terminal,
            exec.size,
            exec.entry
        );
        Ok(Transfer {
            save,
            target: Target::User(TrapFrame::user(exec.entry)),
        })
    }

    fn load(&mut self, pid: Pid, terminal: TerminalId, command: &Command, exec: &ExecImage) -> KResult<()> {
        let resident = self.current_pid();
        self.install_window(pid);
        if let Err(e) = self.copy_image(exec) {
            crate::log_warn!("execute: loading pid {} failed: {}", pid, e);
            self.processes.release(pid);
            if let Some(resident) = resident {
                self.install_window(resident);
            }
            return Err(e);
        }

        let stack = self
            .processes
            .init_pcb(pid, &self.terminals[terminal], command.args())
            .kernel_stack;
        self.cpu.set_kernel_stack(stack);
        self.terminals[terminal].kernel_stack = stack;
        self.terminals[terminal].running = Some(pid);
        Ok(())
    }

    fn copy_image(&mut self, exec: &ExecImage) -> KResult<()> {
        let window = self.cpu.user_slice_mut(PROGRAM_LOAD_ADDR, exec.size as usize)?;
        let copied = self.fs.read_bytes(exec.inode, 0, window)?;
        if copied == exec.size as usize {
            Ok(())
        } else {
            Err(KernelError::Corrupt)
        }
    }
}
