use core::fmt;

/// Kernel error types. Every one of them is recoverable: a syscall that
/// fails hands [`KernelError::status`] back to the user program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Bad descriptor, bad user pointer, oversized token.
    InvalidArgument,
    NotFound,
    /// The file exists but is not a loadable program.
    NotExecutable,
    /// No free pid or no free descriptor.
    ResourceExhausted,
    /// A user address that is in range but not mapped.
    Fault,
    /// The boot file system image is inconsistent.
    Corrupt,
    /// A driver reported a failure.
    Device,
}

impl KernelError {
    /// Value returned to user space. Execute callers rely on "too many
    /// processes" being distinguishable from "bad file".
    pub fn status(self) -> i32 {
        match self {
            KernelError::ResourceExhausted => -2,
            _ => -1,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KernelError::InvalidArgument => write!(f, "Invalid argument"),
            KernelError::NotFound => write!(f, "No such file or directory"),
            KernelError::NotExecutable => write!(f, "Exec format error"),
            KernelError::ResourceExhausted => write!(f, "Resource temporarily unavailable"),
            KernelError::Fault => write!(f, "Bad address"),
            KernelError::Corrupt => write!(f, "File system image is corrupt"),
            KernelError::Device => write!(f, "Input/output error"),
        }
    }
}

pub type KResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_is_distinct_from_bad_file() {
        assert_eq!(KernelError::ResourceExhausted.status(), -2);
        assert_eq!(KernelError::NotExecutable.status(), -1);
        assert_eq!(KernelError::NotFound.status(), -1);
        assert_ne!(
            KernelError::ResourceExhausted.status(),
            KernelError::NotExecutable.status()
        );
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(std::format!("{}", KernelError::Fault), "Bad address");
        assert_eq!(
            std::format!("{}", KernelError::NotExecutable),
            "Exec format error"
        );
    }
}
