//! Waiting for device readiness.
//!
//! Blocking reads never spin inside the kernel lock. A read that cannot
//! complete reports `Poll::Pending`, the caller releases the kernel, waits for
//! the next interrupt, and polls again.

use core::task::Poll;

/// Something that lets time pass between polls.
pub trait Idle {
    fn idle(&mut self);
}

/// Poll until the operation is ready, idling between attempts.
pub fn block_on<T, P, I>(mut poll: P, idle: &mut I) -> T
where
    P: FnMut() -> Poll<T>,
    I: Idle + ?Sized,
{
    loop {
        if let Poll::Ready(value) = poll() {
            return value;
        }
        idle.idle();
    }
}
