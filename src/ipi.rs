//! Inter-processor interrupt fabric: a small fixed set of event types
//! multiplexed over the single `MSIP` line each HART has. A sender sets
//! one bit per pending event type in the target HART's event word and
//! raises `MSIP`; the target's trap handler drains the word and invokes
//! each set event's handler before clearing the hardware pending bit.
//!
//! Grounded in the reference firmware's `sbi_ipi_send_many`/
//! `sbi_ipi_process`, which multiplex HSM-start, fence (TLB shootdown)
//! and a generic "halt" event over the same mechanism.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::SbiError;
use crate::hartmask::HartMask;
use crate::platform;

/// Bit position of each built-in event type in a HART's pending-event
/// word. Extensions needing a new fan-out event add a bit here rather
/// than growing the number of software interrupt lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IpiEvent {
    HsmStart = 1 << 0,
    Fence = 1 << 1,
    Halt = 1 << 2,
    /// Supervisor-software-interrupt relay, driven by the SBI IPI
    /// extension's `send_ipi`.
    Supervisor = 1 << 3,
}

/// Per-HART pending-event bitmask, one instance per HART's scratch
/// extra-space.
pub struct IpiCell {
    pending: AtomicU32,
}

impl IpiCell {
    pub const fn new() -> Self {
        IpiCell { pending: AtomicU32::new(0) }
    }

    fn mark(&self, event: IpiEvent) {
        self.pending.fetch_or(event as u32, Ordering::Release);
    }

    /// Drains and returns the pending event bits, clearing them so a
    /// concurrent sender's bit isn't lost (a `fetch_and(0)` rather than
    /// a plain load-then-store, so a bit set after the load but before
    /// the handler runs for it still gets observed on drain). Returns
    /// the raw bitmask; `process` dispatches each set bit to its
    /// handler before the caller clears the hardware `MSIP` line.
    pub fn drain(&self) -> u32 {
        self.pending.swap(0, Ordering::AcqRel)
    }
}

impl Default for IpiCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-event handler invoked on the receiving HART once its bit is
/// observed set. Implementations live in the module that owns the
/// event's semantics (`hsm` for start, `tlb` for fence).
pub trait IpiHandler: Sync {
    fn handle(&self, sender_hartindex: Option<usize>);
}

struct NopHandler;
impl IpiHandler for NopHandler {
    fn handle(&self, _sender_hartindex: Option<usize>) {}
}

static NOP: NopHandler = NopHandler;
static mut HANDLERS: [&'static dyn IpiHandler; 4] = [&NOP, &NOP, &NOP, &NOP];

fn event_index(event: IpiEvent) -> usize {
    match event {
        IpiEvent::HsmStart => 0,
        IpiEvent::Fence => 1,
        IpiEvent::Halt => 2,
        IpiEvent::Supervisor => 3,
    }
}

/// Registers the handler invoked when `event`'s bit is observed pending.
/// Call during cold boot before any IPI can be sent; not safe to call
/// concurrently with [`process`].
///
/// # Safety
/// Must only be called from the cold-boot HART before any other HART is
/// released.
pub unsafe fn register_handler(event: IpiEvent, handler: &'static dyn IpiHandler) {
    unsafe {
        HANDLERS[event_index(event)] = handler;
    }
}

/// Sets `event` pending on every HART in `targets` and raises their
/// `MSIP`. A release fence orders the event-word write before the
/// `MSIP` raise is observed by the target, so the target's `drain()`
/// is guaranteed to see the bit once it takes the interrupt.
pub fn send_many(targets: &HartMask, event: IpiEvent, cell_for: impl Fn(usize) -> &'static IpiCell) -> Result<(), SbiError> {
    crate::privileged::fence_release();
    for hartindex in targets.iter() {
        cell_for(hartindex).mark(event);
        platform::current().send_ipi(hartindex);
    }
    Ok(())
}

/// Drains this HART's pending-event word and dispatches each set bit to
/// its registered handler, then clears the hardware `MSIP` bit last:
/// the hardware pending bit is the signal "an IPI is outstanding", and
/// clearing it only after every event the signal announced has been
/// handled means a sender never observes `MSIP` cleared while its event
/// is still unprocessed.
pub fn process(cell: &IpiCell, sender_hartindex: Option<usize>) {
    let pending = cell.drain();
    crate::privileged::fence_acquire();
    for (event, idx) in [
        (IpiEvent::HsmStart, 0usize),
        (IpiEvent::Fence, 1),
        (IpiEvent::Halt, 2),
        (IpiEvent::Supervisor, 3),
    ] {
        if pending & event as u32 != 0 {
            let handler = unsafe { HANDLERS[idx] };
            handler.handle(sender_hartindex);
        }
    }
    platform::current().clear_ipi();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_clears_pending_bits() {
        let cell = IpiCell::new();
        cell.mark(IpiEvent::Fence);
        cell.mark(IpiEvent::HsmStart);
        let bits = cell.drain();
        assert_eq!(bits, IpiEvent::Fence as u32 | IpiEvent::HsmStart as u32);
        assert_eq!(cell.drain(), 0);
    }
}
