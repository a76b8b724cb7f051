//! Cold-boot and warm-boot orchestration: the sequence every HART runs
//! between the asm entry trampoline and handing control to the next
//! boot stage (S-mode), plus the per-HART cell tables (HSM state, IPI
//! pending bits, armed timer, queued TLB fences) the trap dispatcher
//! and SBI extensions reach into.
//!
//! Grounded in the reference firmware's `sbi_init_cold`/`sbi_init_warm`:
//! one elected HART builds every shared table (domains, extensions,
//! scratch), then releases the rest with a release-fenced flag; every
//! other HART spins on that flag before touching any of it.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::hartmask::MAX_HARTS;
use crate::hsm::{HartState, HsmCell};
use crate::ipi::IpiCell;
use crate::scratch::Scratch;
use crate::timer::TimerCell;
use crate::tlb::TlbFifo;

/// Per-HART cells addressed by dense hart index. Kept as flat global
/// arrays rather than inside each HART's scratch extra-space arena: the
/// access pattern here (current HART, or a fixed target index from an
/// SBI call) never needs a pointer chase through `mscratch`, so the
/// simpler fixed table costs nothing and avoids threading an allocator
/// call through every one of these modules' constructors.
static HSM_CELLS: [HsmCell; MAX_HARTS] = {
    const STOPPED: HsmCell = HsmCell::new(HartState::Stopped);
    [STOPPED; MAX_HARTS]
};
static IPI_CELLS: [IpiCell; MAX_HARTS] = {
    const CELL: IpiCell = IpiCell::new();
    [CELL; MAX_HARTS]
};
static TIMER_CELLS: [TimerCell; MAX_HARTS] = {
    const CELL: TimerCell = TimerCell::new();
    [CELL; MAX_HARTS]
};
static TLB_FIFOS: [TlbFifo; MAX_HARTS] = {
    const FIFO: TlbFifo = TlbFifo::new();
    [FIFO; MAX_HARTS]
};

pub fn hsm_cell(hartindex: usize) -> &'static HsmCell {
    &HSM_CELLS[hartindex]
}

pub fn ipi_cell(hartindex: usize) -> &'static IpiCell {
    &IPI_CELLS[hartindex]
}

pub fn timer_cell(hartindex: usize) -> &'static TimerCell {
    &TIMER_CELLS[hartindex]
}

pub fn tlb_fifo(hartindex: usize) -> &'static TlbFifo {
    &TLB_FIFOS[hartindex]
}

/// Dense hart index of the HART currently executing, recovered from the
/// `hartindex` field of the scratch struct `mscratch` points at. Valid
/// any time after this HART's scratch has been written, which includes
/// every point from which SBI extensions or the trap dispatcher run.
pub fn current_hartindex() -> usize {
    unsafe { Scratch::from_addr(crate::privileged::read_mscratch()).hartindex }
}

pub fn timer_cell_for_this_hart() -> &'static TimerCell {
    timer_cell(current_hartindex())
}

pub fn ipi_cell_for_this_hart() -> &'static IpiCell {
    ipi_cell(current_hartindex())
}

pub fn tlb_fifo_for_this_hart() -> &'static TlbFifo {
    tlb_fifo(current_hartindex())
}

/// Release-fenced "cold boot finished" flag every warm-booting HART
/// spins on before touching any shared table.
static COLD_BOOT_DONE: AtomicBool = AtomicBool::new(false);

/// Runs once, on the lowest-indexed enabled HART. Builds every
/// process-wide table and releases the rest of the HARTs.
///
/// `hart_count` is the number of HARTs the platform brings up;
/// `fw_start`/`fw_rw_offset`/`fw_size` describe the firmware image for
/// the root domain's text/data regions; `next_addr`/`next_arg1` is the
/// entry point and FDT address handed to the next boot stage;
/// `rpmi_shmem` is the optional RPMI shared-memory reservation parsed
/// from the FDT, forwarded to the MPXY extension's channel registry.
pub fn cold_boot(
    hartindex: usize,
    hart_count: usize,
    fw_start: u64,
    fw_rw_offset: u64,
    fw_size: u64,
    next_addr: u64,
    next_arg1: u64,
    rpmi_shmem: Option<(u64, u64)>,
) -> anyhow::Result<()> {
    use crate::domain::{build_root_domain, DOMAIN_TABLE};

    let root = build_root_domain(hart_count, fw_start, fw_rw_offset, fw_size, hartindex, next_addr, next_arg1)
        .map_err(|e| anyhow::anyhow!("root domain rejected: {e:?}"))?;
    DOMAIN_TABLE.lock().register(root).map_err(|e| anyhow::anyhow!("root domain registration failed: {e:?}"))?;

    configure_delegation();
    configure_pmp_for_hart(hartindex)?;

    for h in 0..hart_count {
        let initial = if h == hartindex { HartState::Started } else { HartState::Stopped };
        hsm_cell(h).reset_for_cold_boot(initial);
    }

    register_ipi_handlers();
    // Safety: called once, before any other HART is released.
    unsafe { crate::sbi::mpxy::register_channels(rpmi_shmem) };
    crate::sbi::register_builtin_extensions();

    COLD_BOOT_DONE.store(true, Ordering::Release);
    Ok(())
}

/// Runs on every HART other than the cold-boot one, and again each time
/// a stopped HART is restarted via the HSM extension.
pub fn warm_boot(hartindex: usize) {
    while !COLD_BOOT_DONE.load(Ordering::Acquire) {
        crate::privileged::wfi();
    }

    configure_delegation();
    let _ = configure_pmp_for_hart(hartindex);
    crate::platform::current().clear_ipi();
    hsm_cell(hartindex).complete_start();
}

fn register_ipi_handlers() {
    use crate::ipi::{self, IpiEvent};

    struct HsmStartHandler;
    impl ipi::IpiHandler for HsmStartHandler {
        fn handle(&self, _sender_hartindex: Option<usize>) {
            // The newly started HART observes its own STARTING->STARTED
            // transition directly in warm_boot; this handler exists so
            // sending the event never finds an unregistered slot.
        }
    }
    static HSM_START: HsmStartHandler = HsmStartHandler;
    static FENCE: CurrentHartFenceHandler = CurrentHartFenceHandler;

    // Safety: called once from the cold-boot HART before any other HART
    // is released.
    unsafe {
        ipi::register_handler(IpiEvent::HsmStart, &HSM_START);
        ipi::register_handler(IpiEvent::Fence, &FENCE);
        crate::sbi::ipi::register();
    }
}

/// Drains *this* HART's fence FIFO, looked up dynamically by
/// `current_hartindex()` rather than a fixed target: the IPI fabric
/// invokes the same handler object on every HART, so the handler must
/// resolve "mine" itself rather than close over one FIFO at
/// registration time.
struct CurrentHartFenceHandler;
impl crate::ipi::IpiHandler for CurrentHartFenceHandler {
    fn handle(&self, _sender_hartindex: Option<usize>) {
        tlb_fifo_for_this_hart().drain_and_apply();
    }
}

fn configure_delegation() {
    use crate::privileged::delegation::{write_medeleg, write_mideleg};
    use crate::privileged::mip_bits;

    let medeleg = (1 << 0)  // instruction misaligned
        | (1 << 3)  // breakpoint
        | (1 << 8)  // ecall from U
        | (1 << 12) // instruction page fault
        | (1 << 13) // load page fault
        | (1 << 15); // store page fault
    let mideleg = mip_bits::SSIP | mip_bits::STIP | mip_bits::SEIP;
    unsafe {
        write_medeleg(medeleg);
        write_mideleg(mideleg);
    }
}

fn configure_pmp_for_hart(hartindex: usize) -> anyhow::Result<()> {
    use crate::domain::DOMAIN_TABLE;
    use crate::pmp;

    let table = DOMAIN_TABLE.lock();
    let domain = table
        .domain_for_hart(hartindex)
        .ok_or_else(|| anyhow::anyhow!("hart {hartindex} has no assigned domain"))?;
    unsafe {
        pmp::configure_oldpmp(domain, 16).map_err(|e| anyhow::anyhow!("pmp configuration failed: {e}"))?;
    }
    Ok(())
}

/// Dispatches a pending `MSIP` interrupt: drains this HART's IPI cell
/// and runs whichever handlers observe a set bit.
pub fn handle_software_interrupt() {
    crate::ipi::process(ipi_cell_for_this_hart(), None);
}

/// The SBI Timer extension's only hardware-facing consequence: when the
/// armed comparator fires, the pending `STIP` bit is left for the
/// supervisor to observe after this trap is redirected/returns, so this
/// handler's only job is disarming the now-fired local copy.
pub fn handle_timer_interrupt() {
    let hartindex = current_hartindex();
    timer_cell(hartindex).set(hartindex, None);
}

/// External interrupts (PLIC) are not this firmware's concern beyond
/// making sure the supervisor sees them; M-mode has no handler of its
/// own for a platform device, so this only exists as a documented
/// no-op rather than falling into `dispatch_interrupt`'s unknown-cause
/// branch.
pub fn handle_external_interrupt() {}
