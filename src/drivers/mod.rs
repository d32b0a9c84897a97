//! The device side of the kernel. Keyboard, RTC and screen drivers are
//! linked in from outside; the core only sees them through [`Devices`].

pub mod tty;

use core::task::Poll;

use crate::error::KResult;

pub use tty::{Terminal, TerminalId, Terminals};

/// Size of the keyboard line buffer each terminal keeps.
pub const LINE_BUFFER_SIZE: usize = 128;

/// What a terminal must get back when it returns to the foreground: the
/// cursor and the half-typed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ConsoleState {
    pub cursor_x: u16,
    pub cursor_y: u16,
    pub line: [u8; LINE_BUFFER_SIZE],
    pub line_len: usize,
}

impl ConsoleState {
    pub const fn new() -> Self {
        ConsoleState {
            cursor_x: 0,
            cursor_y: 0,
            line: [0; LINE_BUFFER_SIZE],
            line_len: 0,
        }
    }

    pub fn line(&self) -> &[u8] {
        &self.line[..self.line_len.min(LINE_BUFFER_SIZE)]
    }
}

impl Default for ConsoleState {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver entry points bound into descriptors and used for terminal switches.
/// Reads that have to wait for hardware report `Poll::Pending` instead of
/// spinning, so the caller can let interrupts through while it waits.
pub trait Devices {
    /// Copy one completed input line of `terminal` into `buf`.
    fn terminal_read(&mut self, terminal: TerminalId, buf: &mut [u8]) -> Poll<usize>;
    /// Print `buf`; a background terminal's output lands in its backup page.
    fn terminal_write(&mut self, terminal: TerminalId, foreground: bool, buf: &[u8]) -> usize;

    fn rtc_open(&mut self, terminal: TerminalId);
    /// Ready once the terminal's virtual RTC has ticked since the last read.
    fn rtc_read(&mut self, terminal: TerminalId) -> Poll<()>;
    /// `hz` is already validated.
    fn rtc_write(&mut self, terminal: TerminalId, hz: u32);
    fn rtc_close(&mut self, terminal: TerminalId) -> KResult<()>;

    /// Snapshot the live console before a foreground switch.
    fn save_console(&mut self) -> ConsoleState;
    fn restore_console(&mut self, state: &ConsoleState);
    /// Drop pending keyboard input for `terminal`.
    fn discard_input(&mut self, terminal: TerminalId);
}
