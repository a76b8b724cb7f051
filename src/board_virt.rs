//! Board glue for QEMU's `virt` machine: the only platform this binary
//! ships a [`PlatformOps`] implementation for. Real board support lives
//! outside this crate's scope (§1's "platform-specific UART drivers...
//! are external collaborators"); this one exists so the firmware is
//! bootable end-to-end on the machine every RISC-V Rust developer
//! already has.

use ironhart::platform::PlatformOps;

/// NS16550-compatible UART, QEMU `virt`'s default console location.
const UART_BASE: usize = 0x1000_0000;
/// SiFive CLINT, QEMU `virt`'s default location: MSIP at +0x0000,
/// MTIMECMP at +0x4000, MTIME at +0xBFF8.
const CLINT_BASE: usize = 0x0200_0000;
const CLINT_MSIP: usize = CLINT_BASE;
const CLINT_MTIMECMP: usize = CLINT_BASE + 0x4000;
const CLINT_MTIME: usize = CLINT_BASE + 0xBFF8;

/// `hart_count` is discovered from the device tree at cold boot, not
/// known at link time, so it lives behind an atomic rather than a plain
/// field: `PlatformOps::hart_count` takes `&self`, and every bound check
/// in the SBI extensions (HSM, IPI, RFENCE) relies on it matching the
/// actual number of HARTs the scratch/domain tables were built for.
pub struct VirtPlatform {
    hart_count: core::sync::atomic::AtomicUsize,
}

impl VirtPlatform {
    pub const fn new() -> Self {
        VirtPlatform { hart_count: core::sync::atomic::AtomicUsize::new(1) }
    }

    pub fn set_hart_count(&self, hart_count: usize) {
        self.hart_count.store(hart_count, core::sync::atomic::Ordering::Release);
    }
}

impl PlatformOps for VirtPlatform {
    fn console_putc(&self, byte: u8) {
        unsafe { core::ptr::write_volatile(UART_BASE as *mut u8, byte) };
    }

    fn console_getc(&self) -> Option<u8> {
        const LSR: usize = 5;
        let lsr = unsafe { core::ptr::read_volatile((UART_BASE + LSR) as *const u8) };
        if lsr & 0x1 == 0 {
            return None;
        }
        Some(unsafe { core::ptr::read_volatile(UART_BASE as *const u8) })
    }

    fn hart_count(&self) -> usize {
        self.hart_count.load(core::sync::atomic::Ordering::Acquire)
    }

    fn timer_set(&self, hartindex: usize, stime_value: Option<u64>) {
        let addr = (CLINT_MTIMECMP + hartindex * 8) as *mut u64;
        unsafe { core::ptr::write_volatile(addr, stime_value.unwrap_or(u64::MAX)) };
    }

    fn time_now(&self) -> u64 {
        unsafe { core::ptr::read_volatile(CLINT_MTIME as *const u64) }
    }

    fn send_ipi(&self, hartindex: usize) {
        let addr = (CLINT_MSIP + hartindex * 4) as *mut u32;
        unsafe { core::ptr::write_volatile(addr, 1) };
    }

    fn clear_ipi(&self) {
        let hartindex = ironhart::init::current_hartindex();
        let addr = (CLINT_MSIP + hartindex * 4) as *mut u32;
        unsafe { core::ptr::write_volatile(addr, 0) };
    }

    fn system_reset(&self, _reset_type: u32, _reset_reason: u32) -> ! {
        // QEMU `virt` exposes a SiFive test-finisher at 0x100000; write
        // the poweroff code to stop the simulation instead of hanging.
        const FINISHER: usize = 0x10_0000;
        const POWEROFF: u32 = 0x5555;
        unsafe { core::ptr::write_volatile(FINISHER as *mut u32, POWEROFF) };
        loop {
            ironhart::privileged::wfi();
        }
    }
}
