//! Nested-fault guard for the unprivileged (MPRV-toggled) probe accesses
//! instruction emulation performs: fetching the faulting opcode itself,
//! and replaying a misaligned or vector load/store one byte/element at a
//! time. Each probe is a real memory access and can fault again; the
//! reference firmware's fault-only-first helpers detect that recursive
//! fault through a one-shot slot in `sbi_scratch` rather than by
//! tracking a general-purpose call stack, and this module is the same
//! idea: arm [`Scratch::trap_context`] with the *outer* [`TrapContext`]
//! pointer (the one the abandoned emulation attempt was called with)
//! before the risky access, and let [`super::dispatch`] notice it's
//! armed on entry to the next trap and clean up instead of running the
//! rest of its normal classification.
//!
//! Each push/pop is explicit: [`NestedGuard::arm`] writes the marker,
//! and its `Drop` clears it again once the guarded access returns
//! normally. If the access instead faults, the fault is handled by a
//! fresh, independent call to [`super::dispatch`] before this guard's
//! `Drop` ever runs — that call consumes the marker itself (see
//! [`take_pending`]) and redirects the *outer* context, so the dropped
//! guard here clearing an already-zeroed slot is a no-op.

use super::regs::TrapContext;
use crate::privileged::read_mscratch;
use crate::scratch::Scratch;

/// Arms the guard for the lifetime of one risky unprivileged access (or
/// a short run of them, via [`NestedGuard::set_byte_offset`]).
pub struct NestedGuard;

impl NestedGuard {
    /// `outer` is the [`TrapContext`] the emulation attempt currently in
    /// progress was dispatched with; `byte_offset` is how far into the
    /// instruction's overall access this particular probe is, recorded
    /// so a fault fixes up `tinst` with the precise offset rather than
    /// just "somewhere in this instruction".
    pub fn arm(outer: &mut TrapContext, byte_offset: usize) -> Self {
        let scratch = unsafe { Scratch::from_addr(read_mscratch()) };
        scratch.trap_context = outer as *mut TrapContext as usize;
        scratch.nested_fault_offset = byte_offset;
        NestedGuard
    }

    pub fn set_byte_offset(&mut self, byte_offset: usize) {
        let scratch = unsafe { Scratch::from_addr(read_mscratch()) };
        scratch.nested_fault_offset = byte_offset;
    }
}

impl Drop for NestedGuard {
    fn drop(&mut self) {
        let scratch = unsafe { Scratch::from_addr(read_mscratch()) };
        scratch.trap_context = 0;
    }
}

/// Called first thing in [`super::dispatch`]. If a guard was armed when
/// this trap was taken, the trap belongs to the guarded probe rather
/// than being an independent fault: returns the outer context to
/// redirect plus the last recorded byte offset, and clears the marker.
pub fn take_pending() -> Option<(&'static mut TrapContext, usize)> {
    let scratch = unsafe { Scratch::from_addr(read_mscratch()) };
    if scratch.trap_context == 0 {
        return None;
    }
    let outer = unsafe { &mut *(scratch.trap_context as *mut TrapContext) };
    let byte_offset = scratch.nested_fault_offset;
    scratch.trap_context = 0;
    Some((outer, byte_offset))
}
