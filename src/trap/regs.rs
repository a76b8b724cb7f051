//! The trapped-context register file, laid out so the entry trampoline
//! in [`super::entry`] can address each field by a compile-time byte
//! offset (`core::mem::offset_of!`) rather than a hand-maintained
//! constant table. Field order matches `struct sbi_trap_regs`.

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapRegs {
    pub zero: usize,
    pub ra: usize,
    pub sp: usize,
    pub gp: usize,
    pub tp: usize,
    pub t0: usize,
    pub t1: usize,
    pub t2: usize,
    pub s0: usize,
    pub s1: usize,
    pub a0: usize,
    pub a1: usize,
    pub a2: usize,
    pub a3: usize,
    pub a4: usize,
    pub a5: usize,
    pub a6: usize,
    pub a7: usize,
    pub s2: usize,
    pub s3: usize,
    pub s4: usize,
    pub s5: usize,
    pub s6: usize,
    pub s7: usize,
    pub s8: usize,
    pub s9: usize,
    pub s10: usize,
    pub s11: usize,
    pub t3: usize,
    pub t4: usize,
    pub t5: usize,
    pub t6: usize,
    pub mepc: usize,
    pub mstatus: usize,
}

/// Additional fault detail that doesn't fit in the architectural
/// `mcause`/`mtval` pair: second trap value (hypervisor extension) and
/// trap instruction, plus whether the faulting access was a guest
/// virtual address. This firmware runs no H-extension code of its own,
/// but carries the fields so a trap redirected into a guest (under a
/// future hypervisor payload) round-trips them unchanged.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapInfo {
    pub cause: usize,
    pub tval: usize,
    pub tval2: usize,
    pub tinst: usize,
    pub gva: usize,
}

/// The full trap context as laid out on the exception stack: register
/// file immediately followed by trap info, matching the layout the
/// entry trampoline writes in two passes (`trap_save_general_regs`
/// then `trap_save_info`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapContext {
    pub regs: TrapRegs,
    pub info: TrapInfo,
}

impl TrapContext {
    pub const SIZE: usize = core::mem::size_of::<TrapContext>();
}
