//! Execution contexts and the transfers between them.
//!
//! The core never jumps anywhere itself. Every operation that ends somewhere
//! other than its caller returns a [`Transfer`], and the architecture glue
//! carries it out after releasing the kernel lock.

use x86_64::registers::rflags::RFlags;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use crate::config::USER_STACK_TOP;
use crate::process::Pid;

/// GDT slots of the flat user segments.
const USER_CODE_INDEX: u16 = 4;
const USER_DATA_INDEX: u16 = 5;
/// EFLAGS bit 1 is reserved and reads as one.
const EFLAGS_RESERVED: u32 = 1 << 1;

/// A suspended kernel stack: the stack and frame pointers captured right after
/// the callee-saved registers were pushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SavedContext {
    pub esp: u32,
    pub ebp: u32,
}

/// The interrupt-return frame that drops a fresh program into ring 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

impl TrapFrame {
    /// Entry into a newly loaded program with interrupts enabled and the
    /// stack at the top of the process window.
    pub fn user(entry: u32) -> Self {
        TrapFrame {
            eip: entry,
            cs: user_code_selector().0 as u32,
            eflags: RFlags::INTERRUPT_FLAG.bits() as u32 | EFLAGS_RESERVED,
            esp: USER_STACK_TOP,
            ss: user_data_selector().0 as u32,
        }
    }
}

pub fn user_code_selector() -> SegmentSelector {
    SegmentSelector::new(USER_CODE_INDEX, PrivilegeLevel::Ring3)
}

pub fn user_data_selector() -> SegmentSelector {
    SegmentSelector::new(USER_DATA_INDEX, PrivilegeLevel::Ring3)
}

/// Which control-block field receives the outgoing stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSlot {
    /// The caller of `execute`, parked until its child halts.
    Exec(Pid),
    /// A process losing the CPU to another terminal.
    Preempt(Pid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Enter user mode through a synthetic interrupt frame.
    User(TrapFrame),
    /// Resume a suspended kernel stack. With a value, the resumed call
    /// returns it (a halt status delivered to `execute`).
    Kernel {
        context: SavedContext,
        value: Option<i32>,
    },
}

/// A pending control transfer: optionally save the current stack into
/// `save`, then continue at `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub save: Option<ContextSlot>,
    pub target: Target,
}

/// Results that may ask the glue to leave the current stack.
pub(crate) trait Handoff {
    fn hands_off(&self) -> bool;
}

impl Handoff for Transfer {
    fn hands_off(&self) -> bool {
        true
    }
}

impl<T: Handoff> Handoff for Option<T> {
    fn hands_off(&self) -> bool {
        self.as_ref().is_some_and(Handoff::hands_off)
    }
}

impl<T: Handoff, E> Handoff for Result<T, E> {
    fn hands_off(&self) -> bool {
        self.as_ref().is_ok_and(Handoff::hands_off)
    }
}
