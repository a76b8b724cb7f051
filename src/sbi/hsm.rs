//! The HSM extension (`EID_HSM = 0x48534D`, "HSM"): lets a supervisor
//! start, stop, suspend and query the state of any HART in its domain.
//! Backed by [`crate::hsm::HsmCell`] for the state machine itself and
//! the platform's [`crate::platform::PlatformOps::hart_start`] hook (or
//! the shared cold-boot release loop, for platforms without one) to
//! actually get a stopped HART executing again.

use super::{SbiExtension, SbiRet};
use crate::error::SbiError;
use crate::ipi::{self, IpiEvent};

pub const EID_HSM: usize = 0x48534D;

const FID_HART_START: usize = 0;
const FID_HART_STOP: usize = 1;
const FID_HART_GET_STATUS: usize = 2;
const FID_HART_SUSPEND: usize = 3;

pub struct HsmExtension;

impl SbiExtension for HsmExtension {
    fn extid_range(&self) -> (usize, usize) {
        (EID_HSM, EID_HSM)
    }

    fn probe(&self, fid: usize) -> bool {
        fid <= FID_HART_SUSPEND
    }

    fn handle(&self, fid: usize, args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError> {
        match fid {
            FID_HART_START => hart_start(args[0], args[1], args[2], ret),
            FID_HART_STOP => hart_stop(ret),
            FID_HART_GET_STATUS => hart_get_status(args[0], ret),
            FID_HART_SUSPEND => hart_suspend(args[0] as u32, args[1], args[2], ret),
            _ => Err(SbiError::NotSupported),
        }
    }
}

fn hart_start(hartindex: usize, resume_addr: usize, opaque: usize, ret: &mut SbiRet) -> Result<(), SbiError> {
    if hartindex >= crate::platform::current().hart_count() {
        return Err(SbiError::InvalidParam);
    }
    crate::init::hsm_cell(hartindex).begin_start()?;
    if !crate::platform::current().hart_start(hartindex, resume_addr, opaque) {
        // No platform-specific release mechanism: the target is already
        // spinning in `init::warm_boot`'s cold-boot-done wait, so an IPI
        // relay is enough to make it re-check its own HSM state and run
        // the warm-boot path again (its own `complete_start` transition
        // drives `STARTING -> STARTED`).
        let targets = crate::hartmask::HartMask::from_hart(hartindex);
        ipi::send_many(&targets, IpiEvent::HsmStart, crate::init::ipi_cell)?;
    }
    ret.value = 0;
    Ok(())
}

fn hart_stop(ret: &mut SbiRet) -> Result<(), SbiError> {
    let hartindex = crate::init::current_hartindex();
    crate::init::hsm_cell(hartindex).begin_stop()?;
    ret.value = 0;
    crate::init::hsm_cell(hartindex).complete_stop()?;
    loop {
        crate::privileged::wfi();
    }
}

fn hart_get_status(hartindex: usize, ret: &mut SbiRet) -> Result<(), SbiError> {
    if hartindex >= crate::platform::current().hart_count() {
        return Err(SbiError::InvalidParam);
    }
    let state = crate::init::hsm_cell(hartindex).get();
    ret.value = state.status_code() as usize;
    Ok(())
}

fn hart_suspend(suspend_type: u32, _resume_addr: usize, _opaque: usize, ret: &mut SbiRet) -> Result<(), SbiError> {
    const RETENTIVE: u32 = 0;
    let hartindex = crate::init::current_hartindex();
    let cell = crate::init::hsm_cell(hartindex);
    cell.begin_suspend()?;
    if suspend_type == RETENTIVE {
        crate::privileged::wfi();
        cell.complete_suspend()?;
        cell.begin_resume()?;
        cell.complete_resume();
        ret.value = 0;
        Ok(())
    } else {
        cell.complete_suspend()?;
        loop {
            crate::privileged::wfi();
        }
    }
}

pub static HSM: HsmExtension = HsmExtension;
