//! Raw port I/O.

use core::arch::asm;
use core::marker::PhantomData;

pub trait PortValue: Copy {
    unsafe fn read_from(port: u16) -> Self;
    unsafe fn write_to(port: u16, value: Self);
}

impl PortValue for u8 {
    unsafe fn read_from(port: u16) -> u8 {
        let value: u8;
        asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        value
    }

    unsafe fn write_to(port: u16, value: u8) {
        asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
    }
}

pub struct Port<T: PortValue> {
    port: u16,
    _value: PhantomData<T>,
}

impl<T: PortValue> Port<T> {
    pub const unsafe fn new(port: u16) -> Self {
        Port {
            port,
            _value: PhantomData,
        }
    }

    pub unsafe fn read(&mut self) -> T {
        T::read_from(self.port)
    }

    pub unsafe fn write(&mut self, value: T) {
        T::write_to(self.port, value)
    }
}
