//! Trap classification and dispatch: what the entry trampoline in
//! [`entry`] calls once the faulting context is saved. Separates
//! "architectural interrupt, handled locally" (timer/software/external)
//! from "synchronous exception", and within exceptions separates
//! "SBI ecall" from "needs emulation" from "not ours, redirect to S-mode"
//! from "fatal".

pub mod atomic;
pub mod entry;
pub mod nested;
pub mod regs;
pub mod unpriv;
pub mod vector;

pub use entry::handler;
pub use regs::{TrapContext, TrapInfo, TrapRegs};

use crate::error::SbiError;
use crate::privileged::{self, mip_bits};
use crate::{debug, error_log};

/// Exception `mcause` values this firmware recognizes. Values above the
/// interrupt bit are not listed; interrupts are handled in
/// [`dispatch_interrupt`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ExceptionCause {
    InstructionMisaligned = 0,
    InstructionAccessFault = 1,
    IllegalInstruction = 2,
    Breakpoint = 3,
    LoadMisaligned = 4,
    LoadAccessFault = 5,
    StoreMisaligned = 6,
    StoreAccessFault = 7,
    EcallFromU = 8,
    EcallFromS = 9,
    EcallFromM = 11,
    InstructionPageFault = 12,
    LoadPageFault = 13,
    StorePageFault = 15,
}

impl ExceptionCause {
    fn from_usize(v: usize) -> Option<Self> {
        use ExceptionCause::*;
        Some(match v {
            0 => InstructionMisaligned,
            1 => InstructionAccessFault,
            2 => IllegalInstruction,
            3 => Breakpoint,
            4 => LoadMisaligned,
            5 => LoadAccessFault,
            6 => StoreMisaligned,
            7 => StoreAccessFault,
            8 => EcallFromU,
            9 => EcallFromS,
            11 => EcallFromM,
            12 => InstructionPageFault,
            13 => LoadPageFault,
            15 => StorePageFault,
            _ => return None,
        })
    }
}

const CAUSE_INTERRUPT_BIT: usize = 1 << (usize::BITS - 1);

/// Entry point called from the asm trampoline with a pointer to the
/// fully saved [`TrapContext`]. Runs with the faulting HART's identity
/// available via `mscratch`/`tp`, interrupts still disabled.
///
/// Returns the context the trampoline should restore registers from and
/// `mret` into. Ordinarily that's `ctx` itself; when this trap turns out
/// to be a nested fault raised by one of the unprivileged probe accesses
/// in [`unpriv`]/[`vector`], it's instead the *outer* context the
/// abandoned emulation attempt was dispatched with — see [`nested`].
#[unsafe(no_mangle)]
extern "C" fn dispatch(ctx: &mut TrapContext) -> &mut TrapContext {
    if let Some((outer, byte_offset)) = nested::take_pending() {
        return redirect_nested_fault(ctx, outer, byte_offset);
    }

    let cause = ctx.info.cause;
    if cause & CAUSE_INTERRUPT_BIT != 0 {
        dispatch_interrupt(cause & !CAUSE_INTERRUPT_BIT);
        return ctx;
    }

    let Some(exc) = ExceptionCause::from_usize(cause) else {
        fatal(ctx, "unknown exception cause");
    };

    match exc {
        ExceptionCause::EcallFromS | ExceptionCause::EcallFromU => {
            dispatch_ecall(ctx);
        }
        ExceptionCause::IllegalInstruction => {
            if atomic::try_emulate(ctx) {
                return ctx;
            }
            redirect_or_fatal(ctx, exc);
        }
        ExceptionCause::LoadMisaligned | ExceptionCause::StoreMisaligned => {
            if vector::try_emulate_misaligned(ctx) {
                return ctx;
            }
            if unpriv::try_emulate_misaligned(ctx, exc) {
                return ctx;
            }
            redirect_or_fatal(ctx, exc);
        }
        _ => redirect_or_fatal(ctx, exc),
    }
    ctx
}

/// A fault raised *during* a guarded unprivileged probe (instruction
/// fetch, or a byte/element of a misaligned or vector replay) is not an
/// independent trap: it propagates as a redirect of the *outer*
/// instruction the probe was emulating, with `tinst` fixed up to the
/// byte offset the probe had reached.
fn redirect_nested_fault<'a>(inner: &TrapContext, outer: &'a mut TrapContext, byte_offset: usize) -> &'a mut TrapContext {
    let cause = inner.info.cause;
    if cause & CAUSE_INTERRUPT_BIT != 0 {
        fatal(outer, "interrupt taken inside a guarded unprivileged probe");
    }
    let Some(exc) = ExceptionCause::from_usize(cause) else {
        fatal(outer, "unknown exception cause inside a guarded unprivileged probe");
    };
    outer.info.cause = cause;
    outer.info.tval = inner.info.tval;
    outer.info.tinst = byte_offset;
    redirect_or_fatal(outer, exc);
    outer
}

fn dispatch_interrupt(code: usize) {
    match code {
        c if c == mip_bits::MSIP.trailing_zeros() as usize => {
            // handled by init::cold_boot-registered IPI cell; looked up
            // through the per-HART scratch extra-space by `crate::ipi`.
            crate::init::handle_software_interrupt();
        }
        c if c == mip_bits::MTIP.trailing_zeros() as usize => {
            crate::init::handle_timer_interrupt();
        }
        c if c == mip_bits::MEIP.trailing_zeros() as usize => {
            crate::init::handle_external_interrupt();
        }
        _ => {
            error_log!("unhandled interrupt cause {}", code);
        }
    }
}

fn dispatch_ecall(ctx: &mut TrapContext) {
    let extid = ctx.regs.a7;
    let funcid = ctx.regs.a6;
    let args = [
        ctx.regs.a0, ctx.regs.a1, ctx.regs.a2, ctx.regs.a3, ctx.regs.a4, ctx.regs.a5,
    ];
    let (error, value) = crate::sbi::dispatch(extid, funcid, &args);
    ctx.regs.a0 = error as usize;
    ctx.regs.a1 = value;
    ctx.regs.mepc = ctx.regs.mepc.wrapping_add(4);
}

/// An exception this HART can't service itself (no emulation path, or
/// emulation declined) is redirected into S-mode if the platform has
/// delegated it there (`medeleg`); otherwise it's fatal, since nothing
/// below M-mode is listening for it.
fn redirect_or_fatal(ctx: &mut TrapContext, exc: ExceptionCause) {
    let medeleg = unsafe { read_medeleg() };
    if medeleg & (1 << exc as usize) != 0 {
        redirect_to_supervisor(ctx, exc as usize);
    } else {
        fatal(ctx, "undelegated exception with no emulation path");
    }
}

unsafe fn read_medeleg() -> usize {
    let v: usize;
    unsafe { core::arch::asm!("csrr {0}, medeleg", out(reg) v) };
    v
}

/// Redirects the trapped context into the supervisor's trap handler:
/// sets `scause`/`stval`/`sepc`, flips `mstatus.SPP`/`SPIE`/`SIE` the
/// way a real hardware trap into S-mode would, and points `mepc` at
/// `stvec` so the subsequent `mret` lands there instead of back at the
/// faulting instruction.
fn redirect_to_supervisor(ctx: &mut TrapContext, cause: usize) {
    unsafe {
        core::arch::asm!("csrw scause, {0}", in(reg) cause);
        core::arch::asm!("csrw stval, {0}", in(reg) ctx.info.tval);
        core::arch::asm!("csrw sepc, {0}", in(reg) ctx.regs.mepc);

        let mut mstatus = ctx.regs.mstatus;
        let spp_was_s = mstatus & privileged::mstatus_bits::MPP_MASK == (1 << privileged::mstatus_bits::MPP_SHIFT);
        mstatus &= !privileged::mstatus_bits::SPP;
        if spp_was_s {
            mstatus |= privileged::mstatus_bits::SPP;
        }
        let sie_was_set = mstatus & privileged::mstatus_bits::SIE != 0;
        mstatus &= !privileged::mstatus_bits::SPIE;
        if sie_was_set {
            mstatus |= privileged::mstatus_bits::SPIE;
        }
        mstatus &= !privileged::mstatus_bits::SIE;
        mstatus &= !privileged::mstatus_bits::MPP_MASK;
        mstatus |= 1 << privileged::mstatus_bits::MPP_SHIFT; // next mret enters S-mode
        ctx.regs.mstatus = mstatus;

        let stvec: usize;
        core::arch::asm!("csrr {0}, stvec", out(reg) stvec);
        ctx.regs.mepc = stvec & !0b11;
    }
}

/// Unrecoverable trap: prints the full register dump and hangs this
/// HART. Other HARTs are unaffected and continue serving SBI calls.
fn fatal(ctx: &TrapContext, reason: &str) -> ! {
    error_log!("fatal trap on hart: {}", reason);
    debug!("  mcause={:#x} mtval={:#x} mepc={:#x}", ctx.info.cause, ctx.info.tval, ctx.regs.mepc);
    debug!("  ra={:#x} sp={:#x} a0={:#x} a1={:#x}", ctx.regs.ra, ctx.regs.sp, ctx.regs.a0, ctx.regs.a1);
    loop {
        privileged::wfi();
    }
}

pub(crate) fn sbi_error_for_emulation_failure() -> SbiError {
    SbiError::Failed
}
