//! Command-line parsing for execute.

use core::fmt;

use crate::config::{ARG_BUFFER_SIZE, PROGRAM_NAME_MAX};
use crate::error::{KResult, KernelError};

/// A parsed command line: the program name and the raw argument text.
#[derive(Clone)]
pub struct Command {
    name: [u8; PROGRAM_NAME_MAX + 1],
    name_len: usize,
    args: [u8; ARG_BUFFER_SIZE],
    args_len: usize,
}

impl Command {
    /// Split `line` at the first run of spaces after the program name. The
    /// line ends at its first NUL; the argument keeps inner spaces and is
    /// truncated to fit the argument buffer with its terminator.
    pub fn parse(line: &[u8]) -> KResult<Self> {
        let line = match line.iter().position(|&b| b == 0) {
            Some(end) => &line[..end],
            None => line,
        };
        let line = trim_start(line);
        let name_end = line.iter().position(|&b| b == b' ').unwrap_or(line.len());
        let (name, rest) = line.split_at(name_end);
        if name.is_empty() || name.len() > PROGRAM_NAME_MAX {
            return Err(KernelError::InvalidArgument);
        }
        let args = trim_end(trim_start(rest));

        let mut command = Command {
            name: [0; PROGRAM_NAME_MAX + 1],
            name_len: name.len(),
            args: [0; ARG_BUFFER_SIZE],
            args_len: args.len().min(ARG_BUFFER_SIZE - 1),
        };
        command.name[..name.len()].copy_from_slice(name);
        command.args[..command.args_len].copy_from_slice(&args[..command.args_len]);
        Ok(command)
    }

    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }

    pub fn args(&self) -> &[u8] {
        &self.args[..self.args_len]
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &core::str::from_utf8(self.name()).unwrap_or("?"))
            .field("args_len", &self.args_len)
            .finish()
    }
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    &bytes[start..]
}

fn trim_end(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &bytes[..end]
}
