//! Stack switching and ring transitions.
//!
//! All three transfer routines share one frame layout: the callee-saved
//! registers pushed as ebp, ebx, esi, edi above the caller's return address.
//! A [`SavedContext`] records the stack and frame pointers right after those
//! pushes, so resuming one pops the registers and returns from whichever
//! routine captured it, with the value in EAX.

use core::arch::naked_asm;
use core::ptr;
use core::task::Poll;

use super::boot::{self, HwKernel};
use crate::config::KERNEL_DATA_SELECTOR;
use crate::scheduler::context::{ContextSlot, SavedContext, Target, TrapFrame};
use crate::sync::{block_on, Idle};
use crate::syscalls::SyscallOutcome;

/// Save the current stack into `save` (when non-null) and drop into ring 3
/// through `frame`. Returns only when the saved context is resumed.
#[unsafe(naked)]
pub unsafe extern "C" fn enter_user(save: *mut SavedContext, frame: *const TrapFrame) -> i32 {
    naked_asm!(
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        "mov eax, [esp + 20]",
        "test eax, eax",
        "jz 2f",
        "mov [eax], esp",
        "mov [eax + 4], ebp",
        "2:",
        "mov ecx, [esp + 24]",
        "mov eax, [ecx + 16]",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "push eax",
        "push dword ptr [ecx + 12]",
        "push dword ptr [ecx + 8]",
        "push dword ptr [ecx + 4]",
        "push dword ptr [ecx]",
        "iretd",
    );
}

/// Save the current stack into `save` and resume `load`, which sees `value`
/// as its return value.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(
    save: *mut SavedContext,
    load: *const SavedContext,
    value: i32,
) -> i32 {
    naked_asm!(
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        "mov eax, [esp + 20]",
        "mov [eax], esp",
        "mov [eax + 4], ebp",
        "mov ecx, [esp + 24]",
        "mov eax, [esp + 28]",
        "mov edx, [ecx + 4]",
        "mov esp, [ecx]",
        "mov ebp, edx",
        "pop edi",
        "pop esi",
        "pop ebx",
        "pop ebp",
        "ret",
    );
}

/// Abandon the current stack and resume `load` with `value`.
#[unsafe(naked)]
pub unsafe extern "C" fn resume_with(load: *const SavedContext, value: i32) -> ! {
    naked_asm!(
        "mov ecx, [esp + 4]",
        "mov eax, [esp + 8]",
        "mov ebp, [ecx + 4]",
        "mov esp, [ecx]",
        "pop edi",
        "pop esi",
        "pop ebx",
        "pop ebp",
        "ret",
    );
}

/// The `int 0x80` handler, entered from ring 3 on the process's kernel stack.
///
/// Convention: EAX = call number, EBX/ECX/EDX = arguments. Returns in EAX;
/// every other register comes back unchanged.
#[unsafe(naked)]
pub unsafe extern "C" fn syscall_entry() {
    naked_asm!(
        "push fs",
        "push es",
        "push ds",
        "push ebp",
        "push edi",
        "push esi",
        "push edx",
        "push ecx",
        "push ebx",
        // syscall_dispatch(number, arg0, arg1, arg2)
        "push edx",
        "push ecx",
        "push ebx",
        "push eax",
        "mov cx, {kernel_data}",
        "mov ds, cx",
        "mov es, cx",
        "call {dispatch}",
        "add esp, 16",
        "pop ebx",
        "pop ecx",
        "pop edx",
        "pop esi",
        "pop edi",
        "pop ebp",
        "pop ds",
        "pop es",
        "pop fs",
        "iretd",
        kernel_data = const KERNEL_DATA_SELECTOR,
        dispatch = sym syscall_dispatch,
    );
}

/// Waits for a device with interrupts let through.
struct HaltIdle;

impl Idle for HaltIdle {
    fn idle(&mut self) {
        let enabled = super::are_enabled();
        super::enable();
        super::halt();
        if !enabled {
            super::disable();
        }
    }
}

enum Step {
    Return(i32),
    Jump(*mut SavedContext, Target),
}

extern "C" fn syscall_dispatch(number: u32, arg0: u32, arg1: u32, arg2: u32) -> i32 {
    let kernel = boot::kernel();
    let step = block_on(
        || {
            let mut kernel = kernel.lock();
            match kernel.syscall(number, arg0, arg1, arg2) {
                SyscallOutcome::Pending => Poll::Pending,
                SyscallOutcome::Return(value) => Poll::Ready(Step::Return(value)),
                SyscallOutcome::Transfer(transfer) => {
                    // interrupts stay masked until the target runs
                    let save = save_slot(&mut kernel, transfer.save);
                    Poll::Ready(Step::Jump(save, transfer.target))
                }
            }
        },
        &mut HaltIdle,
    );
    match step {
        Step::Return(value) => value,
        Step::Jump(save, target) => unsafe { perform(save, target) },
    }
}

/// Where the outgoing stack goes. The control block lives in the kernel
/// singleton, so the pointer stays valid after the lock is released.
pub(crate) fn save_slot(kernel: &mut HwKernel, slot: Option<ContextSlot>) -> *mut SavedContext {
    let Some(slot) = slot else {
        return ptr::null_mut();
    };
    match kernel.context_slot_mut(slot) {
        Some(context) => context,
        None => {
            crate::log_error!("transfer saves into {:?}, which has no control block", slot);
            panic!("context slot of a dead process");
        }
    }
}

/// Carry out a transfer. The kernel lock must already be released. Returns
/// only if `save` was captured and later resumed.
pub(crate) unsafe fn perform(save: *mut SavedContext, target: Target) -> i32 {
    match target {
        Target::User(frame) => enter_user(save, &frame),
        Target::Kernel { context, value } if !save.is_null() => {
            switch_context(save, &context, value.unwrap_or(0))
        }
        Target::Kernel { context, value } => resume_with(&context, value.unwrap_or(0)),
    }
}
