//! Firmware console: a bounded line buffer behind a spinlock, drained to
//! the platform's raw character sink. This is both the `debug!` logging
//! sink and the backing store for the legacy SBI console extensions
//! (`sbi_console_putchar`/`sbi_console_getchar`).

use core::fmt::{self, Write};

use heapless::spsc::Queue;
use spin::Mutex;

use crate::platform::{self, PlatformOps};

const LINE_CAPACITY: usize = 256;

struct ConsoleState {
    rx: Queue<u8, LINE_CAPACITY>,
}

static STATE: Mutex<ConsoleState> = Mutex::new(ConsoleState { rx: Queue::new() });

/// Writer handle used by the `debug!`/`warn!`/`error!` macros and by the
/// legacy console SBI extension. Holds no state of its own; every byte
/// goes straight to the platform sink under the console lock.
pub struct Console;

impl Console {
    pub fn new() -> Self {
        Console
    }

    /// Writes a single byte to the platform console, translating `\n`
    /// to `\r\n` the way a serial console expects.
    pub fn putc(c: u8) {
        let ops = platform::current();
        if c == b'\n' {
            ops.console_putc(b'\r');
        }
        ops.console_putc(c);
    }

    /// Non-blocking read of a previously buffered received byte, fed by
    /// the platform's console RX interrupt handler (where the platform
    /// has one) via [`Console::feed_rx`].
    pub fn getc() -> Option<u8> {
        let mut st = STATE.lock();
        st.rx.dequeue().or_else(|| platform::current().console_getc())
    }

    /// Called from a console RX interrupt path to buffer a received byte
    /// for later consumption by [`Console::getc`].
    pub fn feed_rx(byte: u8) {
        let mut st = STATE.lock();
        let _ = st.rx.enqueue(byte);
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            Self::putc(b);
        }
        Ok(())
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __console_write {
    ($($args:tt)+) => ({
        use core::fmt::Write;
        let _ = write!($crate::console::Console::new(), $($args)+);
    });
}

/// Logs an informational line, prefixed the way this firmware's console
/// output is always prefixed so a serial capture can be grepped by level.
#[macro_export]
macro_rules! debug {
    () => ({ $crate::__console_write!("\r\n") });
    ($fmt:expr) => ({ $crate::__console_write!(concat!("[ironhart] ", $fmt, "\r\n")) });
    ($fmt:expr, $($args:tt)+) => ({ $crate::__console_write!(concat!("[ironhart] ", $fmt, "\r\n"), $($args)+) });
}

#[macro_export]
macro_rules! warn_log {
    ($fmt:expr) => ({ $crate::__console_write!(concat!("[ironhart] warn: ", $fmt, "\r\n")) });
    ($fmt:expr, $($args:tt)+) => ({ $crate::__console_write!(concat!("[ironhart] warn: ", $fmt, "\r\n"), $($args)+) });
}

#[macro_export]
macro_rules! error_log {
    ($fmt:expr) => ({ $crate::__console_write!(concat!("[ironhart] error: ", $fmt, "\r\n")) });
    ($fmt:expr, $($args:tt)+) => ({ $crate::__console_write!(concat!("[ironhart] error: ", $fmt, "\r\n"), $($args)+) });
}
