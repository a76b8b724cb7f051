//! The seam between the generic dispatch/trap/domain logic and whatever
//! a concrete board needs done in hardware terms: raw console I/O,
//! timer compare register programming, and sending an inter-processor
//! interrupt. Every hook has a safe do-nothing default so a platform
//! that doesn't implement a capability degrades to "not supported"
//! rather than failing to link.

use spin::Once;

/// Board-specific hooks. A platform crate implements this once and
/// registers it with [`set_platform`] before the first HART reaches
/// `init::cold_boot`.
pub trait PlatformOps: Sync {
    /// Writes one raw byte to the platform's debug/console sink.
    fn console_putc(&self, byte: u8);

    /// Non-blocking read of one byte from the console, if available.
    fn console_getc(&self) -> Option<u8> {
        None
    }

    /// Number of HARTs this platform brings up.
    fn hart_count(&self) -> usize;

    /// Per-HART stack size in bytes.
    fn hart_stack_size(&self) -> usize {
        1 << 14
    }

    /// Firmware heap size in bytes.
    fn heap_size(&self) -> usize {
        1 << 20
    }

    /// Programs the local timer comparator for `hartindex` to fire at
    /// `stime_value` (an absolute `mtime` tick count), or disables it
    /// when `None`. Platforms without an SBI Timer counterpart (e.g. no
    /// CLINT) should treat this as a no-op and report `Timer` as
    /// unsupported in their extension probe.
    fn timer_set(&self, hartindex: usize, stime_value: Option<u64>);

    /// Reads the current platform time counter, in the same units as
    /// `timer_set`'s `stime_value`.
    fn time_now(&self) -> u64;

    /// Raises `MSIP` for `hartindex` (software interrupt delivery for
    /// the IPI fabric).
    fn send_ipi(&self, hartindex: usize);

    /// Clears this HART's own pending software interrupt after it has
    /// been processed by [`crate::ipi`].
    fn clear_ipi(&self);

    /// Releases a HART parked at the platform-specific wait-for-start
    /// point, pointing it at `resume_addr` with `a1 = opaque`. Returns
    /// `false` if the platform has no mechanism to do so (e.g. it relies
    /// purely on every HART already spinning in firmware and being
    /// released by a shared boot flag, which the HSM module manages
    /// itself without this hook).
    fn hart_start(&self, _hartindex: usize, _resume_addr: usize, _opaque: usize) -> bool {
        false
    }

    /// Platform-specific system reset. Does not return on success.
    fn system_reset(&self, _reset_type: u32, _reset_reason: u32) -> ! {
        loop {
            crate::privileged::wfi();
        }
    }
}

/// A platform with no board-specific behavior beyond spinning; used by
/// `cold_boot` before a real `PlatformOps` has been installed and by
/// host-side unit tests.
pub struct NullPlatform;

impl PlatformOps for NullPlatform {
    fn console_putc(&self, _byte: u8) {}

    fn hart_count(&self) -> usize {
        1
    }

    fn timer_set(&self, _hartindex: usize, _stime_value: Option<u64>) {}

    fn time_now(&self) -> u64 {
        0
    }

    fn send_ipi(&self, _hartindex: usize) {}

    fn clear_ipi(&self) {}
}

static PLATFORM: Once<&'static dyn PlatformOps> = Once::new();
static NULL_PLATFORM: NullPlatform = NullPlatform;

/// Installs the board's `PlatformOps` implementation. Must be called
/// exactly once, by the boot HART, before any other HART can observe
/// [`current`] — subsequent calls are ignored.
pub fn set_platform(ops: &'static dyn PlatformOps) {
    PLATFORM.call_once(|| ops);
}

/// Returns the installed platform, or [`NullPlatform`] if none has been
/// installed yet.
pub fn current() -> &'static dyn PlatformOps {
    PLATFORM.get().copied().unwrap_or(&NULL_PLATFORM)
}
