//! Symbolic access to the handful of machine-mode primitives the rest of
//! the firmware is not allowed to reach around: CSR read/write, fences,
//! and the `wfi`/`mret` transitions. Every other module refers to CSRs by
//! name through this module rather than writing `asm!` inline.

use riscv::register::{mcause, mepc, mie, mip, mscratch, mstatus, mtval};

/// Bits of `mstatus` this firmware manipulates directly, named the way the
/// privileged spec names them (the `riscv` crate's `mstatus` module only
/// exposes field accessors, not raw bit constants).
pub mod mstatus_bits {
    pub const MIE: usize = 1 << 3;
    pub const MPIE: usize = 1 << 7;
    pub const SIE: usize = 1 << 1;
    pub const SPIE: usize = 1 << 5;
    pub const SPP: usize = 1 << 8;
    pub const MPP_SHIFT: usize = 11;
    pub const MPP_MASK: usize = 0b11 << MPP_SHIFT;
    pub const MPRV: usize = 1 << 17;
    pub const MXR: usize = 1 << 19;
}

pub mod mip_bits {
    pub const SSIP: usize = 1 << 1;
    pub const MSIP: usize = 1 << 3;
    pub const STIP: usize = 1 << 5;
    pub const MTIP: usize = 1 << 7;
    pub const SEIP: usize = 1 << 9;
    pub const MEIP: usize = 1 << 11;
}

/// Reads the current HART's hardware id.
#[inline(always)]
pub fn hart_id() -> usize {
    riscv::register::mhartid::read()
}

#[inline(always)]
pub fn read_mscratch() -> usize {
    mscratch::read()
}

/// # Safety
/// Overwrites the per-HART scratch pointer; callers must ensure no other
/// code on this HART dereferences the old value concurrently.
#[inline(always)]
pub unsafe fn write_mscratch(val: usize) {
    mscratch::write(val)
}

#[inline(always)]
pub fn read_mcause() -> usize {
    mcause::read().bits()
}

#[inline(always)]
pub fn read_mtval() -> usize {
    mtval::read()
}

#[inline(always)]
pub fn read_mepc() -> usize {
    mepc::read()
}

/// # Safety
/// Changes the resume address for the next `mret` on this HART.
#[inline(always)]
pub unsafe fn write_mepc(val: usize) {
    mepc::write(val)
}

#[inline(always)]
pub fn read_mstatus() -> usize {
    mstatus_raw()
}

fn mstatus_raw() -> usize {
    let bits: usize;
    unsafe { core::arch::asm!("csrr {0}, mstatus", out(reg) bits) };
    bits
}

/// # Safety
/// Caller must ensure the written value keeps `mstatus` in a state this
/// HART's current trap-handling code can still operate under (in
/// particular, never clear `MIE` while a trap handler itself relies on
/// interrupts remaining enabled for its own nested traps).
#[inline(always)]
pub unsafe fn write_mstatus(val: usize) {
    core::arch::asm!("csrw mstatus, {0}", in(reg) val);
}

/// # Safety
/// See [`write_mstatus`].
#[inline(always)]
pub unsafe fn set_mstatus(mask: usize) {
    core::arch::asm!("csrs mstatus, {0}", in(reg) mask);
}

/// # Safety
/// See [`write_mstatus`].
#[inline(always)]
pub unsafe fn clear_mstatus(mask: usize) {
    core::arch::asm!("csrc mstatus, {0}", in(reg) mask);
}

#[inline(always)]
pub fn read_mie() -> usize {
    mie::read().bits()
}

/// # Safety
/// Enables/disables which interrupt sources this HART can take; callers
/// must only disable sources whose handlers they are certain are not
/// awaited elsewhere on this HART.
#[inline(always)]
pub unsafe fn write_mie(val: usize) {
    core::arch::asm!("csrw mie, {0}", in(reg) val);
}

#[inline(always)]
pub fn read_mip() -> usize {
    mip::read().bits()
}

/// # Safety
/// Clearing a pending bit here is how software interrupts are
/// acknowledged; clearing the wrong bit drops a real event.
#[inline(always)]
pub unsafe fn clear_mip(mask: usize) {
    core::arch::asm!("csrc mip, {0}", in(reg) mask);
}

/// # Safety
/// Sets a pending interrupt bit, which will fire as soon as the
/// corresponding `mie` bit and `mstatus.MIE` are set.
#[inline(always)]
pub unsafe fn set_mip(mask: usize) {
    core::arch::asm!("csrs mip, {0}", in(reg) mask);
}

/// Idles until an enabled interrupt is pending.
#[inline(always)]
pub fn wfi() {
    riscv::asm::wfi();
}

#[inline(always)]
pub fn fence_i() {
    riscv::asm::fence_i();
}

/// Full local TLB flush (all ASIDs, all addresses).
#[inline(always)]
pub fn sfence_vma_all() {
    unsafe { core::arch::asm!("sfence.vma x0, x0") };
}

#[inline(always)]
pub fn sfence_vma_addr(addr: usize) {
    unsafe { core::arch::asm!("sfence.vma {0}, x0", in(reg) addr) };
}

#[inline(always)]
pub fn sfence_vma_asid(asid: usize) {
    unsafe { core::arch::asm!("sfence.vma x0, {0}", in(reg) asid) };
}

#[inline(always)]
pub fn sfence_vma_addr_asid(addr: usize, asid: usize) {
    unsafe { core::arch::asm!("sfence.vma {0}, {1}", in(reg) addr, in(reg) asid) };
}

/// A memory ordering fence providing release semantics for a write that
/// must be visible before a subsequent cross-HART signal (IPI, doorbell).
#[inline(always)]
pub fn fence_release() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::Release);
}

/// The acquire counterpart of [`fence_release`].
#[inline(always)]
pub fn fence_acquire() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::Acquire);
}

/// Reads a raw PMP config byte out of `pmpcfgN` (`N = index / regs_per_csr`).
///
/// # Safety
/// `index` must be a PMP entry this HART's `sbi_hart_features.pmp_count`
/// reports as present.
pub unsafe fn pmpcfg_read(csr_index: usize) -> usize {
    macro_rules! read_one {
        ($idx:literal, $name:literal) => {
            if csr_index == $idx {
                let v: usize;
                core::arch::asm!(concat!("csrr {0}, ", $name), out(reg) v);
                return v;
            }
        };
    }
    read_one!(0, "pmpcfg0");
    read_one!(2, "pmpcfg2");
    #[cfg(target_pointer_width = "32")]
    {
        read_one!(1, "pmpcfg1");
        read_one!(3, "pmpcfg3");
    }
    0
}

/// # Safety
/// See [`pmpcfg_read`].
pub unsafe fn pmpcfg_write(csr_index: usize, val: usize) {
    macro_rules! write_one {
        ($idx:literal, $name:literal) => {
            if csr_index == $idx {
                core::arch::asm!(concat!("csrw ", $name, ", {0}"), in(reg) val);
                return;
            }
        };
    }
    write_one!(0, "pmpcfg0");
    write_one!(2, "pmpcfg2");
    #[cfg(target_pointer_width = "32")]
    {
        write_one!(1, "pmpcfg1");
        write_one!(3, "pmpcfg3");
    }
}

/// Expands to 16 `$m!(i, "pmpaddrI")` invocations; used by both the
/// `pmpaddr_read`/`pmpaddr_write` match ladders below so the 16 entries
/// only need to be spelled out once.
macro_rules! seq {
    ($m:ident) => {
        $m!(0, "pmpaddr0");
        $m!(1, "pmpaddr1");
        $m!(2, "pmpaddr2");
        $m!(3, "pmpaddr3");
        $m!(4, "pmpaddr4");
        $m!(5, "pmpaddr5");
        $m!(6, "pmpaddr6");
        $m!(7, "pmpaddr7");
        $m!(8, "pmpaddr8");
        $m!(9, "pmpaddr9");
        $m!(10, "pmpaddr10");
        $m!(11, "pmpaddr11");
        $m!(12, "pmpaddr12");
        $m!(13, "pmpaddr13");
        $m!(14, "pmpaddr14");
        $m!(15, "pmpaddr15");
    };
}

/// # Safety
/// `index` must be < 16 (the architectural maximum PMP entry count) and
/// present on this HART.
pub unsafe fn pmpaddr_read(index: usize) -> usize {
    macro_rules! read_one {
        ($idx:literal, $name:literal) => {
            if index == $idx {
                let v: usize;
                core::arch::asm!(concat!("csrr {0}, ", $name), out(reg) v);
                return v;
            }
        };
    }
    seq!(read_one);
    0
}

/// # Safety
/// See [`pmpaddr_read`].
pub unsafe fn pmpaddr_write(index: usize, val: usize) {
    macro_rules! write_one {
        ($idx:literal, $name:literal) => {
            if index == $idx {
                core::arch::asm!(concat!("csrw ", $name, ", {0}"), in(reg) val);
                return;
            }
        };
    }
    seq!(write_one);
}

/// Bits of `mseccfg` used by the Smepmp two-pass configuration.
pub mod mseccfg_bits {
    pub const MML: usize = 1 << 0;
    pub const MMWP: usize = 1 << 1;
    pub const RLB: usize = 1 << 2;
}

/// # Safety
/// Only meaningful when Smepmp (`Smepmp`/`zicfilp`-era `mseccfg`) is
/// present; writing on a HART without it traps as illegal-instruction.
pub unsafe fn mseccfg_read() -> usize {
    let v: usize;
    core::arch::asm!("csrr {0}, 0x747", out(reg) v);
    v
}

/// # Safety
/// See [`mseccfg_read`].
pub unsafe fn mseccfg_write(val: usize) {
    core::arch::asm!("csrw 0x747, {0}", in(reg) val);
}

/// # Safety
/// See [`mseccfg_read`].
pub unsafe fn mseccfg_set(mask: usize) {
    core::arch::asm!("csrs 0x747, {0}", in(reg) mask);
}

/// # Safety
/// See [`mseccfg_read`].
pub unsafe fn mseccfg_clear(mask: usize) {
    core::arch::asm!("csrc 0x747, {0}", in(reg) mask);
}

/// Delegation CSRs, read/written once at cold/warm boot.
pub mod delegation {
    /// # Safety
    /// Must only run in M-mode, before any S-mode code relies on a
    /// particular delegation state.
    pub unsafe fn write_medeleg(val: usize) {
        core::arch::asm!("csrw medeleg, {0}", in(reg) val);
    }

    /// # Safety
    /// See [`write_medeleg`].
    pub unsafe fn write_mideleg(val: usize) {
        core::arch::asm!("csrw mideleg, {0}", in(reg) val);
    }
}
