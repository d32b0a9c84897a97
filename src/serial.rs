//! COM1 logging. On bare metal every line goes out the UART; host test
//! builds print to stderr so failing tests show the kernel's trace.

#[cfg(all(target_arch = "x86", not(test)))]
mod uart {
    use crate::interrupts::port::Port;
    use lazy_static::lazy_static;
    use spin::Mutex;

    pub struct SerialPort {
        data: Port<u8>,
        int_en: Port<u8>,
        fifo_ctrl: Port<u8>,
        line_ctrl: Port<u8>,
        modem_ctrl: Port<u8>,
        line_sts: Port<u8>,
    }

    impl SerialPort {
        pub const unsafe fn new(base: u16) -> SerialPort {
            SerialPort {
                data: Port::new(base),
                int_en: Port::new(base + 1),
                fifo_ctrl: Port::new(base + 2),
                line_ctrl: Port::new(base + 3),
                modem_ctrl: Port::new(base + 4),
                line_sts: Port::new(base + 5),
            }
        }

        pub fn init(&mut self) {
            unsafe {
                self.int_en.write(0x00);
                // DLAB on, 38400 baud, 8N1, FIFO on
                self.line_ctrl.write(0x80);
                self.data.write(0x03);
                self.int_en.write(0x00);
                self.line_ctrl.write(0x03);
                self.fifo_ctrl.write(0xC7);
                self.modem_ctrl.write(0x0B);
            }
        }

        fn wait_for_tx_empty(&mut self) {
            unsafe { while (self.line_sts.read() & 0x20) == 0 {} }
        }

        pub fn send(&mut self, data: u8) {
            self.wait_for_tx_empty();
            unsafe { self.data.write(data) }
        }
    }

    impl core::fmt::Write for SerialPort {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            for byte in s.bytes() {
                self.send(byte);
            }
            Ok(())
        }
    }

    lazy_static! {
        pub static ref SERIAL1: Mutex<SerialPort> = {
            let mut serial_port = unsafe { SerialPort::new(0x3F8) };
            serial_port.init();
            Mutex::new(serial_port)
        };
    }
}

#[cfg(all(target_arch = "x86", not(test)))]
pub use uart::SERIAL1;

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    #[cfg(all(target_arch = "x86", not(test)))]
    {
        use core::fmt::Write;
        let _ = SERIAL1.lock().write_fmt(args);
    }
    #[cfg(test)]
    std::eprint!("{}", args);
    #[cfg(all(not(target_arch = "x86"), not(test)))]
    let _ = args;
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!("[INFO] {}\n", format_args!($($arg)*)));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!("[WARN] {}\n", format_args!($($arg)*)));
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!("[ERROR] {}\n", format_args!($($arg)*)));
    };
}

/// Scheduler tracing, compiled in only with the `trace-sched` feature.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if cfg!(feature = "trace-sched") {
            $crate::serial::_print(format_args!("[DEBUG] {}\n", format_args!($($arg)*)));
        }
    };
}

pub fn init() {
    #[cfg(all(target_arch = "x86", not(test)))]
    {
        let _ = SERIAL1.lock();
    }
}
