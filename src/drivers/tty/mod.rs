//! Terminal records. Three virtual consoles exist for the whole run; each
//! owns a process tree, a backup copy of the screen and its saved console.

use core::fmt;
use core::ops::{Index, IndexMut};

use super::ConsoleState;
use crate::config::{NUM_TERMINALS, VIDEO_BACKUPS};
use crate::cpu::KernelStack;
use crate::process::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TerminalId(u8);

impl TerminalId {
    pub fn new(index: usize) -> Option<Self> {
        (index < NUM_TERMINALS).then_some(TerminalId(index as u8))
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The terminal `step` places after this one, wrapping around.
    fn after(self, step: usize) -> TerminalId {
        TerminalId(((self.index() + step) % NUM_TERMINALS) as u8)
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tty{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Terminal {
    id: TerminalId,
    /// Process currently bound to this terminal, if its shell has started.
    pub running: Option<Pid>,
    foreground: bool,
    backup_page: u32,
    pub console: ConsoleState,
    /// Stack fields of whichever process last ran here, saved on switch-out.
    pub kernel_stack: KernelStack,
}

impl Terminal {
    const fn new(id: TerminalId) -> Self {
        Terminal {
            id,
            running: None,
            foreground: false,
            backup_page: VIDEO_BACKUPS[id.index()],
            console: ConsoleState::new(),
            kernel_stack: KernelStack { ss0: 0, esp0: 0 },
        }
    }

    pub fn id(&self) -> TerminalId {
        self.id
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    /// Physical page holding this terminal's screen while it is hidden.
    pub fn backup_page(&self) -> u32 {
        self.backup_page
    }
}

/// All terminals plus the two cursors over them: the one on screen and the one
/// whose process owns the CPU. They differ whenever a background terminal runs.
#[derive(Debug, Clone)]
pub struct Terminals {
    records: [Terminal; NUM_TERMINALS],
    running: TerminalId,
}

impl Terminals {
    pub const fn new() -> Self {
        let mut records = [const { Terminal::new(TerminalId(0)) }; NUM_TERMINALS];
        let mut i = 1;
        while i < NUM_TERMINALS {
            records[i] = Terminal::new(TerminalId(i as u8));
            i += 1;
        }
        records[0].foreground = true;
        Terminals {
            records,
            running: TerminalId(0),
        }
    }

    pub fn foreground(&self) -> TerminalId {
        self.records
            .iter()
            .find(|t| t.foreground)
            .map_or(TerminalId(0), |t| t.id)
    }

    pub fn set_foreground(&mut self, id: TerminalId) {
        for terminal in self.records.iter_mut() {
            terminal.foreground = terminal.id == id;
        }
    }

    /// The CPU-resident terminal.
    pub fn running(&self) -> TerminalId {
        self.running
    }

    pub fn set_running(&mut self, id: TerminalId) {
        self.running = id;
    }

    /// Round robin: the first terminal after the running one that has a
    /// process. `None` when no other terminal does.
    pub fn next_runnable(&self) -> Option<TerminalId> {
        (1..NUM_TERMINALS)
            .map(|step| self.running.after(step))
            .find(|&id| self[id].running.is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Terminal> {
        self.records.iter()
    }
}

impl Default for Terminals {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<TerminalId> for Terminals {
    type Output = Terminal;
    fn index(&self, id: TerminalId) -> &Terminal {
        &self.records[id.index()]
    }
}

impl IndexMut<TerminalId> for Terminals {
    fn index_mut(&mut self, id: TerminalId) -> &mut Terminal {
        &mut self.records[id.index()]
    }
}
