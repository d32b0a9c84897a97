//! The driver collaborators as the platform code hands them over: a table of
//! C-ABI entry points, one per [`Devices`] operation.

use core::task::Poll;

use crate::drivers::{ConsoleState, Devices, TerminalId};
use crate::error::{KResult, KernelError};

#[repr(C)]
pub struct DriverTable {
    /// Copies one finished line, or returns a negative value if none is ready.
    pub terminal_read: extern "C" fn(terminal: u8, buf: *mut u8, len: usize) -> i32,
    pub terminal_write: extern "C" fn(terminal: u8, foreground: bool, buf: *const u8, len: usize) -> usize,
    pub rtc_open: extern "C" fn(terminal: u8),
    /// True once the terminal's virtual clock has ticked since the last call.
    pub rtc_ready: extern "C" fn(terminal: u8) -> bool,
    pub rtc_write: extern "C" fn(terminal: u8, hz: u32),
    /// Zero on success.
    pub rtc_close: extern "C" fn(terminal: u8) -> i32,
    pub save_console: extern "C" fn(out: *mut ConsoleState),
    pub restore_console: extern "C" fn(state: *const ConsoleState),
    pub discard_input: extern "C" fn(terminal: u8),
}

/// Unbound until `kernel_main` receives the platform's table.
pub struct Drivers(Option<&'static DriverTable>);

impl Drivers {
    pub const fn unbound() -> Self {
        Drivers(None)
    }

    pub fn bind(&mut self, table: &'static DriverTable) {
        self.0 = Some(table);
    }

    fn table(&self) -> &'static DriverTable {
        match self.0 {
            Some(table) => table,
            None => {
                crate::log_error!("drivers used before kernel_main bound them");
                panic!("no driver table");
            }
        }
    }
}

fn raw(terminal: TerminalId) -> u8 {
    terminal.index() as u8
}

impl Devices for Drivers {
    fn terminal_read(&mut self, terminal: TerminalId, buf: &mut [u8]) -> Poll<usize> {
        match (self.table().terminal_read)(raw(terminal), buf.as_mut_ptr(), buf.len()) {
            n if n < 0 => Poll::Pending,
            n => Poll::Ready((n as usize).min(buf.len())),
        }
    }

    fn terminal_write(&mut self, terminal: TerminalId, foreground: bool, buf: &[u8]) -> usize {
        (self.table().terminal_write)(raw(terminal), foreground, buf.as_ptr(), buf.len())
    }

    fn rtc_open(&mut self, terminal: TerminalId) {
        (self.table().rtc_open)(raw(terminal))
    }

    fn rtc_read(&mut self, terminal: TerminalId) -> Poll<()> {
        if (self.table().rtc_ready)(raw(terminal)) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    fn rtc_write(&mut self, terminal: TerminalId, hz: u32) {
        (self.table().rtc_write)(raw(terminal), hz)
    }

    fn rtc_close(&mut self, terminal: TerminalId) -> KResult<()> {
        match (self.table().rtc_close)(raw(terminal)) {
            0 => Ok(()),
            status => {
                crate::log_warn!("rtc: close on {} failed ({})", terminal, status);
                Err(KernelError::Device)
            }
        }
    }

    fn save_console(&mut self) -> ConsoleState {
        let mut state = ConsoleState::new();
        (self.table().save_console)(&mut state);
        state
    }

    fn restore_console(&mut self, state: &ConsoleState) {
        (self.table().restore_console)(state)
    }

    fn discard_input(&mut self, terminal: TerminalId) {
        (self.table().discard_input)(raw(terminal))
    }
}
