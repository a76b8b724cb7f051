//! The machine-mode trap entry trampoline: switches onto the exception
//! stack, saves the full register file and fault detail, calls the Rust
//! dispatcher with a pointer to the saved context, then restores
//! everything and `mret`s back. A 1:1 port of the reference firmware's
//! `fw_base.S` trap entry, translated into inline `asm!` blocks instead
//! of a `.S` file so the byte offsets come from `core::mem::offset_of!`
//! rather than a hand-maintained assembler header.

use core::arch::asm;
use core::mem::offset_of;

use crate::privileged::mstatus_bits;
use crate::scratch::Scratch;
use crate::trap::regs::{TrapContext, TrapInfo, TrapRegs};

/// Installed into `mtvec` once the real dispatcher is ready to run.
/// Must stay 4-byte aligned (direct mode, vector bit clear).
#[unsafe(no_mangle)]
#[repr(align(4))]
pub extern "C" fn handler() {
    save_and_setup_sp_t0();
    save_mepc_status();
    save_general_regs_except_sp_t0();
    save_info();
    call_dispatch();
    restore_general_regs_except_a0_t0();
    restore_mepc_status();
    restore_a0_t0();
    unsafe { asm!("mret") }
}

#[inline(always)]
fn save_and_setup_sp_t0() {
    unsafe {
        asm!(
            "csrrw tp, mscratch, tp",
            "sd t0, {tmp0_off}(tp)",
            "csrr t0, mstatus",
            "srl t0, t0, {mpp_shift}",
            "and t0, t0, {priv_m}",
            "slti t0, t0, {priv_m}",
            "add t0, t0, -1",
            "xor sp, sp, tp",
            "and t0, t0, sp",
            "xor sp, sp, tp",
            "xor t0, tp, t0",
            "sd sp, ({sp_off}-{ctx_size})(t0)",
            "add sp, t0, -{ctx_size}",
            "ld t0, {tmp0_off}(tp)",
            "sd t0, {t0_off}(sp)",
            "csrrw tp, mscratch, tp",
            tmp0_off = const offset_of!(Scratch, tmp0),
            mpp_shift = const mstatus_bits::MPP_SHIFT,
            priv_m = const 3,
            ctx_size = const TrapContext::SIZE,
            sp_off = const offset_of!(TrapContext, regs) + offset_of!(TrapRegs, sp),
            t0_off = const offset_of!(TrapContext, regs) + offset_of!(TrapRegs, t0),
        )
    }
}

#[inline(always)]
fn save_mepc_status() {
    unsafe {
        asm!(
            "csrr t0, mepc",
            "sd t0, {mepc_off}(sp)",
            "csrr t0, mstatus",
            "sd t0, {mstatus_off}(sp)",
            mepc_off = const offset_of!(TrapContext, regs) + offset_of!(TrapRegs, mepc),
            mstatus_off = const offset_of!(TrapContext, regs) + offset_of!(TrapRegs, mstatus),
        )
    }
}

#[inline(always)]
fn save_general_regs_except_sp_t0() {
    let base = offset_of!(TrapContext, regs);
    macro_rules! off {
        ($f:ident) => {
            base + offset_of!(TrapRegs, $f)
        };
    }
    unsafe {
        asm!(
            "sd zero, {o_zero}(sp)", "sd ra, {o_ra}(sp)", "sd gp, {o_gp}(sp)", "sd tp, {o_tp}(sp)",
            "sd t1, {o_t1}(sp)", "sd t2, {o_t2}(sp)", "sd s0, {o_s0}(sp)", "sd s1, {o_s1}(sp)",
            "sd a0, {o_a0}(sp)", "sd a1, {o_a1}(sp)", "sd a2, {o_a2}(sp)", "sd a3, {o_a3}(sp)",
            "sd a4, {o_a4}(sp)", "sd a5, {o_a5}(sp)", "sd a6, {o_a6}(sp)", "sd a7, {o_a7}(sp)",
            "sd s2, {o_s2}(sp)", "sd s3, {o_s3}(sp)", "sd s4, {o_s4}(sp)", "sd s5, {o_s5}(sp)",
            "sd s6, {o_s6}(sp)", "sd s7, {o_s7}(sp)", "sd s8, {o_s8}(sp)", "sd s9, {o_s9}(sp)",
            "sd s10, {o_s10}(sp)", "sd s11, {o_s11}(sp)", "sd t3, {o_t3}(sp)", "sd t4, {o_t4}(sp)",
            "sd t5, {o_t5}(sp)", "sd t6, {o_t6}(sp)",
            o_zero = const off!(zero), o_ra = const off!(ra), o_gp = const off!(gp), o_tp = const off!(tp),
            o_t1 = const off!(t1), o_t2 = const off!(t2), o_s0 = const off!(s0), o_s1 = const off!(s1),
            o_a0 = const off!(a0), o_a1 = const off!(a1), o_a2 = const off!(a2), o_a3 = const off!(a3),
            o_a4 = const off!(a4), o_a5 = const off!(a5), o_a6 = const off!(a6), o_a7 = const off!(a7),
            o_s2 = const off!(s2), o_s3 = const off!(s3), o_s4 = const off!(s4), o_s5 = const off!(s5),
            o_s6 = const off!(s6), o_s7 = const off!(s7), o_s8 = const off!(s8), o_s9 = const off!(s9),
            o_s10 = const off!(s10), o_s11 = const off!(s11), o_t3 = const off!(t3), o_t4 = const off!(t4),
            o_t5 = const off!(t5), o_t6 = const off!(t6),
        )
    }
}

#[inline(always)]
fn save_info() {
    let regs_size = core::mem::size_of::<TrapRegs>();
    unsafe {
        asm!(
            "csrr t0, mcause",
            "sd t0, ({regs_size} + {cause_off})(sp)",
            "csrr t0, mtval",
            "sd t0, ({regs_size} + {tval_off})(sp)",
            "sd zero, ({regs_size} + {tval2_off})(sp)",
            "sd zero, ({regs_size} + {tinst_off})(sp)",
            "sd zero, ({regs_size} + {gva_off})(sp)",
            regs_size = const regs_size,
            cause_off = const offset_of!(TrapInfo, cause),
            tval_off = const offset_of!(TrapInfo, tval),
            tval2_off = const offset_of!(TrapInfo, tval2),
            tinst_off = const offset_of!(TrapInfo, tinst),
            gva_off = const offset_of!(TrapInfo, gva),
        )
    }
}

#[inline(always)]
fn call_dispatch() {
    unsafe {
        asm!(
            "add a0, sp, zero",
            "call {dispatch}",
            dispatch = sym super::dispatch,
        )
    }
}

#[inline(always)]
fn restore_general_regs_except_a0_t0() {
    let base = offset_of!(TrapContext, regs);
    macro_rules! off {
        ($f:ident) => {
            base + offset_of!(TrapRegs, $f)
        };
    }
    unsafe {
        asm!(
            "ld ra, {o_ra}(a0)", "ld sp, {o_sp}(a0)", "ld gp, {o_gp}(a0)", "ld tp, {o_tp}(a0)",
            "ld t1, {o_t1}(a0)", "ld t2, {o_t2}(a0)", "ld s0, {o_s0}(a0)", "ld s1, {o_s1}(a0)",
            "ld a1, {o_a1}(a0)", "ld a2, {o_a2}(a0)", "ld a3, {o_a3}(a0)", "ld a4, {o_a4}(a0)",
            "ld a5, {o_a5}(a0)", "ld a6, {o_a6}(a0)", "ld a7, {o_a7}(a0)",
            "ld s2, {o_s2}(a0)", "ld s3, {o_s3}(a0)", "ld s4, {o_s4}(a0)", "ld s5, {o_s5}(a0)",
            "ld s6, {o_s6}(a0)", "ld s7, {o_s7}(a0)", "ld s8, {o_s8}(a0)", "ld s9, {o_s9}(a0)",
            "ld s10, {o_s10}(a0)", "ld s11, {o_s11}(a0)", "ld t3, {o_t3}(a0)", "ld t4, {o_t4}(a0)",
            "ld t5, {o_t5}(a0)", "ld t6, {o_t6}(a0)",
            o_sp = const off!(sp), o_ra = const off!(ra), o_gp = const off!(gp), o_tp = const off!(tp),
            o_t1 = const off!(t1), o_t2 = const off!(t2), o_s0 = const off!(s0), o_s1 = const off!(s1),
            o_a1 = const off!(a1), o_a2 = const off!(a2), o_a3 = const off!(a3),
            o_a4 = const off!(a4), o_a5 = const off!(a5), o_a6 = const off!(a6), o_a7 = const off!(a7),
            o_s2 = const off!(s2), o_s3 = const off!(s3), o_s4 = const off!(s4), o_s5 = const off!(s5),
            o_s6 = const off!(s6), o_s7 = const off!(s7), o_s8 = const off!(s8), o_s9 = const off!(s9),
            o_s10 = const off!(s10), o_s11 = const off!(s11), o_t3 = const off!(t3), o_t4 = const off!(t4),
            o_t5 = const off!(t5), o_t6 = const off!(t6),
        )
    }
}

#[inline(always)]
fn restore_mepc_status() {
    unsafe {
        asm!(
            "ld t0, {mstatus_off}(a0)",
            "csrw mstatus, t0",
            "ld t0, {mepc_off}(a0)",
            "csrw mepc, t0",
            mstatus_off = const offset_of!(TrapContext, regs) + offset_of!(TrapRegs, mstatus),
            mepc_off = const offset_of!(TrapContext, regs) + offset_of!(TrapRegs, mepc),
        )
    }
}

#[inline(always)]
fn restore_a0_t0() {
    unsafe {
        asm!(
            "ld t0, {t0_off}(a0)",
            "ld a0, {a0_off}(a0)",
            t0_off = const offset_of!(TrapContext, regs) + offset_of!(TrapRegs, t0),
            a0_off = const offset_of!(TrapContext, regs) + offset_of!(TrapRegs, a0),
        )
    }
}
