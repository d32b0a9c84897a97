//! System call dispatch.
//!
//! User programs trap with the call number in EAX and up to three arguments
//! in EBX, ECX and EDX. Every failure becomes a negative return value; the
//! kernel never stops because of what a user program passed in.

use core::task::Poll;

use crate::config::VIDMAP_ADDR;
use crate::cpu::Cpu;
use crate::drivers::Devices;
use crate::error::{KResult, KernelError};
use crate::fs::{FileSystem, IoContext};
use crate::kernel::Kernel;
use crate::loader::Command;
use crate::memory;
use crate::process::{ExitStatus, Pid};
use crate::scheduler::context::Transfer;

pub const SYS_HALT: u32 = 1;
pub const SYS_EXECUTE: u32 = 2;
pub const SYS_READ: u32 = 3;
pub const SYS_WRITE: u32 = 4;
pub const SYS_OPEN: u32 = 5;
pub const SYS_CLOSE: u32 = 6;
pub const SYS_GETARGS: u32 = 7;
pub const SYS_VIDMAP: u32 = 8;
pub const SYS_SET_HANDLER: u32 = 9;
pub const SYS_SIGRETURN: u32 = 10;

/// How a system call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// Return this value in EAX.
    Return(i32),
    /// A device is not ready. Release the kernel, wait for an interrupt and
    /// issue the same call again; nothing has been consumed yet.
    Pending,
    /// Do not return to the caller; carry out this transfer instead.
    Transfer(Transfer),
}

impl From<KResult<i32>> for SyscallOutcome {
    fn from(result: KResult<i32>) -> Self {
        match result {
            Ok(value) => SyscallOutcome::Return(value),
            Err(e) => SyscallOutcome::Return(e.status()),
        }
    }
}

impl From<KResult<Transfer>> for SyscallOutcome {
    fn from(result: KResult<Transfer>) -> Self {
        match result {
            Ok(transfer) => SyscallOutcome::Transfer(transfer),
            Err(e) => SyscallOutcome::Return(e.status()),
        }
    }
}

impl<C: Cpu, F: FileSystem, D: Devices> Kernel<C, F, D> {
    /// Central dispatcher, called from the `int 0x80` entry with the
    /// CPU-resident process as the caller.
    pub fn syscall(&mut self, number: u32, arg0: u32, arg1: u32, arg2: u32) -> SyscallOutcome {
        let Some(pid) = self.current_pid() else {
            crate::log_error!("syscall {} with no resident process", number);
            return SyscallOutcome::Return(-1);
        };
        match number {
            SYS_HALT => self.halt(ExitStatus::Exited(arg0 as u8)).into(),
            SYS_EXECUTE => self.sys_execute(arg0).into(),
            SYS_READ => match self.sys_read(pid, arg0 as i32, arg1, arg2 as i32) {
                Poll::Ready(result) => result.map(|n| n as i32).into(),
                Poll::Pending => SyscallOutcome::Pending,
            },
            SYS_WRITE => self.sys_write(pid, arg0 as i32, arg1, arg2 as i32).map(|n| n as i32).into(),
            SYS_OPEN => self.sys_open(pid, arg0).map(|fd| fd as i32).into(),
            SYS_CLOSE => self.sys_close(pid, arg0 as i32).map(|()| 0i32).into(),
            SYS_GETARGS => self.sys_getargs(pid, arg0, arg1 as i32).map(|()| 0i32).into(),
            SYS_VIDMAP => self.sys_vidmap(pid, arg0).map(|()| 0i32).into(),
            SYS_SET_HANDLER | SYS_SIGRETURN => SyscallOutcome::Return(0),
            _ => {
                crate::log_warn!("syscall: unknown number {}", number);
                SyscallOutcome::Return(-1)
            }
        }
    }

    fn sys_execute(&mut self, command: u32) -> KResult<Transfer> {
        let command = {
            let bytes = self.user_string(command)?;
            Command::parse(bytes)?
        };
        self.execute_command(&command)
    }

    fn sys_read(&mut self, pid: Pid, fd: i32, buf: u32, nbytes: i32) -> Poll<KResult<usize>> {
        let len = match usize::try_from(nbytes) {
            Ok(len) => len,
            Err(_) => return Poll::Ready(Err(KernelError::InvalidArgument)),
        };
        let Some(pcb) = self.processes.get_mut(pid) else {
            return Poll::Ready(Err(KernelError::InvalidArgument));
        };
        let buf = match self.cpu.user_slice_mut(buf, len) {
            Ok(buf) => buf,
            Err(e) => return Poll::Ready(Err(e)),
        };
        let mut io = IoContext {
            fs: &self.fs,
            devices: &mut self.devices,
            terminal: pcb.terminal,
            foreground: self.terminals[pcb.terminal].is_foreground(),
        };
        pcb.fds.read(&mut io, fd, buf)
    }

    fn sys_write(&mut self, pid: Pid, fd: i32, buf: u32, nbytes: i32) -> KResult<usize> {
        let len = usize::try_from(nbytes).map_err(|_| KernelError::InvalidArgument)?;
        let pcb = self.processes.get_mut(pid).ok_or(KernelError::InvalidArgument)?;
        let buf = self.cpu.user_slice(buf, len)?;
        let mut io = IoContext {
            fs: &self.fs,
            devices: &mut self.devices,
            terminal: pcb.terminal,
            foreground: self.terminals[pcb.terminal].is_foreground(),
        };
        pcb.fds.write(&mut io, fd, buf)
    }

    fn sys_open(&mut self, pid: Pid, name: u32) -> KResult<usize> {
        let pcb = self.processes.get_mut(pid).ok_or(KernelError::InvalidArgument)?;
        let name = user_string(&self.cpu, name)?;
        let mut io = IoContext {
            fs: &self.fs,
            devices: &mut self.devices,
            terminal: pcb.terminal,
            foreground: self.terminals[pcb.terminal].is_foreground(),
        };
        pcb.fds.open(&mut io, name)
    }

    fn sys_close(&mut self, pid: Pid, fd: i32) -> KResult<()> {
        let pcb = self.processes.get_mut(pid).ok_or(KernelError::InvalidArgument)?;
        let mut io = IoContext {
            fs: &self.fs,
            devices: &mut self.devices,
            terminal: pcb.terminal,
            foreground: self.terminals[pcb.terminal].is_foreground(),
        };
        pcb.fds.close(&mut io, fd)
    }

    /// Copy the argument string, terminator included. Fails when there is no
    /// argument or it does not fit.
    fn sys_getargs(&mut self, pid: Pid, buf: u32, nbytes: i32) -> KResult<()> {
        let len = usize::try_from(nbytes).map_err(|_| KernelError::InvalidArgument)?;
        let pcb = self.processes.get(pid).ok_or(KernelError::InvalidArgument)?;
        let args = pcb.args();
        if len == 0 || args.is_empty() || args.len() + 1 > len {
            return Err(KernelError::InvalidArgument);
        }
        let out = self.cpu.user_slice_mut(buf, args.len() + 1)?;
        out[..args.len()].copy_from_slice(args);
        out[args.len()] = 0;
        Ok(())
    }

    /// Map the screen at the vidmap address and store that address through
    /// `screen_start`. A hidden terminal gets its backup page instead.
    fn sys_vidmap(&mut self, pid: Pid, screen_start: u32) -> KResult<()> {
        if !memory::in_user_window(screen_start, 4) {
            return Err(KernelError::InvalidArgument);
        }
        let terminal = self
            .processes
            .get(pid)
            .ok_or(KernelError::InvalidArgument)?
            .terminal;
        self.critical(|kernel| kernel.point_video_alias(terminal));
        self.cpu
            .user_slice_mut(screen_start, 4)?
            .copy_from_slice(&VIDMAP_ADDR.to_le_bytes());
        Ok(())
    }

    fn user_string(&self, addr: u32) -> KResult<&[u8]> {
        user_string(&self.cpu, addr)
    }
}

/// A NUL-terminated string in user memory, without its terminator. It must
/// end inside the region it starts in.
fn user_string<C: Cpu>(cpu: &C, addr: u32) -> KResult<&[u8]> {
    let span = memory::user_span(addr)?;
    let bytes = cpu.user_slice(addr, span)?;
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(KernelError::InvalidArgument)?;
    Ok(&bytes[..end])
}
